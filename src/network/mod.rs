//! Transport helpers shared by the listeners and the upstream client.

pub mod tcp;
pub mod tls;

pub use tcp::{MAX_FRAME_SIZE, read_frame, write_frame};
pub use tls::{client_config, load_acceptor};
