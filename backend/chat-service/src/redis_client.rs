use redis::aio::ConnectionManager;
use redis::{Client, RedisResult};

/// Redis handle shared by publishers.
///
/// The `ConnectionManager` reconnects transparently and is cheap to clone.
/// Pub/sub listeners need a dedicated connection, so the raw `Client` is kept too.
#[derive(Clone)]
pub struct RedisClient {
    client: Client,
    manager: ConnectionManager,
}

impl RedisClient {
    pub async fn from_url(url: &str) -> RedisResult<Self> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, manager })
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }
}
