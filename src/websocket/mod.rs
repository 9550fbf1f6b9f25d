mod handler;
mod keepalive;
mod message;
mod session;

pub use handler::ws_handler;
pub use keepalive::KeepaliveConfig;
pub use message::ControlFrame;
pub use session::{read_loop, write_loop, ReaderExit, Session, SessionExit, WriterExit};
