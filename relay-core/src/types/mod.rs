pub use callback::*;
pub use message::*;
pub use pagination::*;
pub use tx::*;

mod callback;
mod message;
mod pagination;
mod tx;
