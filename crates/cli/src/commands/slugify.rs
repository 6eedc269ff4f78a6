// `folio slugify`: the slug the editor would derive from a title.

use clap::Args;
use serde::Serialize;

use folio_common::slug::slugify;

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct SlugifyArgs {
    /// Title text; multiple words are joined with spaces.
    #[arg(required = true)]
    pub text: Vec<String>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SlugResult {
    pub input: String,
    pub slug: String,
}

pub fn run(args: SlugifyArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = slug_for(&args.text);
    output::print_output(format, &result, |r| r.slug.clone())?;
    Ok(())
}

fn slug_for(words: &[String]) -> SlugResult {
    let input = words.join(" ");
    let slug = slugify(&input);
    SlugResult { input, slug }
}
