pub mod packet;
pub mod packet_queue;

pub use packet::Packet;
pub use packet_queue::{PacketQueue, PopMode, Popped};
