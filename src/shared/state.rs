use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;

use crate::config::AppConfig;
use crate::payments::razorpay::RazorpayClient;
use crate::realtime::MachineRegistry;
use crate::shared::utils::DbPool;

pub struct AppState {
    pub config: AppConfig,
    pub conn: DbPool,
    pub drive: Option<S3Client>,
    pub razorpay: Option<RazorpayClient>,
    pub registry: Arc<MachineRegistry>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            conn: self.conn.clone(),
            drive: self.drive.clone(),
            razorpay: self.razorpay.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}
