// folio-common: draft content pipeline shared by the editor and the CLI.

pub mod extract;
pub mod format;
pub mod html;
pub mod import;
pub mod slug;
pub mod types;
