pub mod browser;

pub use browser::ChromiumRenderer;
