pub mod board;
pub mod init;
pub mod label;
pub mod lane;
pub mod stage;
pub mod task;
