mod anchor_selector;
mod error;
mod fold_until_stop;

pub use anchor_selector::anchor_selector;
pub use error::GhostGuiError;
pub use fold_until_stop::fold_until_stop;
