pub mod init;
pub mod replay;
pub mod summary;
pub mod validate;
