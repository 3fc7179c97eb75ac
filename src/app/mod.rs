mod browser_probe;
mod checker;
mod classify;
mod config;
mod data_io;
mod error;
mod http_probe;
mod runtime;
#[cfg(test)]
mod test_support;
mod types;
mod webdriver;

pub use runtime::run;
