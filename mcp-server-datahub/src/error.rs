use crate::client::ClientError;
use crate::server::ServerError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Server(#[from] ServerError),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn exit_code(&self) -> i32 {
        1
    }
}
