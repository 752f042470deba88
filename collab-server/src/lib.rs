pub mod classroom;
pub mod server;
pub mod storage;
