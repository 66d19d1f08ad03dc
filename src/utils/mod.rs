pub mod clean_text;

pub use clean_text::clean_text;
