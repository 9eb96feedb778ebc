use std::sync::Arc;

use domus_domain::chat::ChatService;
use domus_domain::ports::db::DbAdapter;
use domus_infra::config::AppConfig;
use domus_infra::db::{MemoryAdapter, SqliteAdapter};
use domus_infra::repositories::memory::{
    InMemoryAuditSink, InMemoryChatRepository, InMemoryDealSink, InMemoryPropertyDirectory,
    InMemoryReadMarkStore, InMemoryUserDirectory,
};
use domus_infra::repositories::sqlite::{
    SqliteAuditSink, SqliteChatRepository, SqliteDealSink, SqlitePropertyDirectory,
    SqliteReadMarkStore, SqliteUserDirectory,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub chat: ChatService,
    pub db: Arc<dyn DbAdapter>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        match config.data_backend.as_str() {
            "sqlite" => {
                let adapter = SqliteAdapter::open(&config.sqlite_path)?;
                adapter.ensure_schema().await?;
                let conn = adapter.connection();
                let chat = ChatService::new(
                    Arc::new(SqliteChatRepository::new(conn.clone())),
                    Arc::new(SqliteReadMarkStore::new(conn.clone())),
                    Arc::new(SqlitePropertyDirectory::new(conn.clone())),
                    Arc::new(SqliteUserDirectory::new(conn.clone())),
                    Arc::new(SqliteDealSink::new(conn.clone())),
                    Arc::new(SqliteAuditSink::new(conn)),
                )
                .with_fallback_seller(config.fallback_seller());
                Ok(Self {
                    config,
                    chat,
                    db: Arc::new(adapter),
                })
            }
            _ => {
                let chat = ChatService::new(
                    Arc::new(InMemoryChatRepository::new()),
                    Arc::new(InMemoryReadMarkStore::new()),
                    Arc::new(InMemoryPropertyDirectory::new()),
                    Arc::new(InMemoryUserDirectory::new()),
                    Arc::new(InMemoryDealSink::new()),
                    Arc::new(InMemoryAuditSink::new()),
                )
                .with_fallback_seller(config.fallback_seller());
                Ok(Self {
                    config,
                    chat,
                    db: Arc::new(MemoryAdapter),
                })
            }
        }
    }

    #[allow(dead_code)]
    pub fn with_chat_service(config: AppConfig, chat: ChatService) -> Self {
        Self {
            config,
            chat,
            db: Arc::new(MemoryAdapter),
        }
    }
}
