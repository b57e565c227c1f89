use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{Resolver, TokioResolver};
use log::debug;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};

/// Resolver used by the shared client. Several of the sites are filtered
/// by local ISP resolvers, so the system configuration is replaced by
/// Cloudflare when it cannot be read.
#[derive(Debug, Default, Clone)]
pub struct DoHResolver {
    state: Arc<OnceLock<TokioResolver>>,
}

impl DoHResolver {
    fn init_resolver(&self) -> TokioResolver {
        match Resolver::builder(TokioConnectionProvider::default()) {
            Ok(builder) => builder.build(),
            Err(err) => {
                debug!("[dns] system resolver config unavailable ({err}), using cloudflare");
                Resolver::builder_with_config(
                    ResolverConfig::cloudflare(),
                    TokioConnectionProvider::default(),
                )
                .build()
            }
        }
    }
}

impl Resolve for DoHResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.clone();

        Box::pin(async move {
            let lookup = resolver
                .state
                .get_or_init(|| resolver.init_resolver())
                .lookup_ip(name.as_str())
                .await?;

            let addrs: Addrs = Box::new(lookup.into_iter().map(|addr| SocketAddr::new(addr, 0)));

            Ok(addrs)
        })
    }
}
