pub use provider::*;

mod provider;
