use dbarchiver_config::{Config, ReplicaConfig};
use mysql_async::Pool;

use crate::dsn;

/// The three connection pools a run may need: source and destination are
/// always present, the replica pool only when the lag monitor is enabled.
#[derive(Clone)]
pub struct Pools {
    pub source: Pool,
    pub destination: Pool,
    pub replica: Option<Pool>,
}

impl Pools {
    pub fn connect(config: &Config) -> Self {
        Pools {
            source: Pool::new(dsn::opts_for(&config.source)),
            destination: Pool::new(dsn::opts_for(&config.destination)),
            replica: config.replica.as_ref().map(Self::replica_pool),
        }
    }

    fn replica_pool(replica: &ReplicaConfig) -> Pool {
        Pool::new(dsn::replica_opts(replica))
    }

    /// Disconnect every pool, draining outstanding connections. Best-effort:
    /// errors are swallowed since this only runs during shutdown.
    pub async fn disconnect(self) {
        let _ = self.source.disconnect().await;
        let _ = self.destination.disconnect().await;
        if let Some(replica) = self.replica {
            let _ = replica.disconnect().await;
        }
    }
}
