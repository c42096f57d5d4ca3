use std::time::Duration;

use dbarchiver_config::{ConnectionConfig, TlsMode};
use mysql_async::{Opts, OptsBuilder, PoolConstraints, PoolOpts, SslOpts};

/// How long a pooled connection may live before it is recycled, per
/// spec.md §5 ("a 10-minute connection lifetime").
const CONNECTION_LIFETIME: Duration = Duration::from_secs(600);

/// Build `mysql_async::Opts` for a `source`/`destination`/`replica`
/// connection, including pool bounds and TLS mode.
pub fn opts_for(config: &ConnectionConfig) -> Opts {
    let mut builder = OptsBuilder::default()
        .ip_or_hostname(config.host.clone())
        .tcp_port(config.port)
        .user(Some(config.user.clone()))
        .pass(Some(config.password.clone()))
        .db_name(Some(config.database.clone()))
        .conn_ttl(Some(CONNECTION_LIFETIME))
        .pool_opts(pool_opts(config.max_connections, config.max_idle_connections));

    builder = match config.tls {
        TlsMode::Disable => builder.ssl_opts(None),
        // Opportunistic TLS: encrypt the connection but don't hard-fail on
        // an unverifiable certificate.
        TlsMode::Preferred => builder.ssl_opts(Some(
            SslOpts::default().with_danger_accept_invalid_certs(true),
        )),
        TlsMode::Required => builder.ssl_opts(Some(SslOpts::default())),
    };

    Opts::from(builder)
}

fn pool_opts(max_connections: u32, max_idle_connections: u32) -> PoolOpts {
    let max = max_connections.max(1) as usize;
    let min = max_idle_connections.min(max_connections).max(1) as usize;
    PoolOpts::default().with_constraints(
        PoolConstraints::new(min, max).unwrap_or_else(|| PoolConstraints::new(1, 1).unwrap()),
    )
}

/// Build `mysql_async::Opts` for the optional replica connection used by
/// the lag monitor.
pub fn replica_opts(replica: &dbarchiver_config::ReplicaConfig) -> Opts {
    let builder = OptsBuilder::default()
        .ip_or_hostname(replica.host.clone())
        .tcp_port(replica.port)
        .user(Some(replica.user.clone()))
        .pass(Some(replica.password.clone()))
        .conn_ttl(Some(CONNECTION_LIFETIME));
    Opts::from(builder)
}
