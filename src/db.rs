use anyhow::Result;
use sqlx::{Pool, Postgres};
use std::env;
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::issuer::CompletionEvent;

pub type Db = Pool<Postgres>;

pub async fn connect() -> Result<Db> {
    let url = env::var("DATABASE_URL").expect("DATABASE_URL not set");
    Ok(Pool::<Postgres>::connect(&url).await?)
}

/// Shared handler state: the pool, the completion-event channel feeding the
/// certificate issuer worker, and the root directory for generated documents.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub events: mpsc::Sender<CompletionEvent>,
    pub data_dir: PathBuf,
}

pub fn data_dir() -> PathBuf {
    PathBuf::from(env::var("DATA_DIR").unwrap_or("./data".into()))
}
