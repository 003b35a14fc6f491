use crate::constants::SERVICE_DOMAIN;
use crate::error::{self, Result};
use crate::Exposure;
use k8s_openapi::api::core::v1::Service;
use snafu::{OptionExt, ResultExt};
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, SocketAddr};
use url::Url;

/// The in-cluster DNS name of `service` in `namespace`.
pub fn service_host(service: &str, namespace: &str) -> String {
    format!("{}.{}.{}", service, namespace, SERVICE_DOMAIN)
}

/// The URL at which a deployed application is reachable. Derived once, right after its service
/// has been created.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DeployedEndpoint {
    url: Url,
}

impl DeployedEndpoint {
    /// `https://<service>.<namespace>.svc.cluster.local:<port>`
    pub fn cluster_internal(service: &str, namespace: &str, port: i32) -> Result<Self> {
        Self::parse(format!(
            "https://{}:{}",
            service_host(service, namespace),
            port
        ))
    }

    /// `https://<node address>:<node port>`. Fails for ports outside `1..=65535`.
    pub fn external(node: IpAddr, node_port: i32) -> Result<Self> {
        let port = u16::try_from(node_port)
            .ok()
            .filter(|port| *port != 0)
            .context(error::InvalidNodePortSnafu { port: node_port })?;
        // `SocketAddr` brackets IPv6 addresses.
        Self::parse(format!("https://{}", SocketAddr::new(node, port)))
    }

    /// Derive the endpoint from a service as returned by the store. Externally exposed services
    /// use the first node address and the node port allocated to the service's first port; when
    /// no node address is known the in-cluster name is used instead.
    pub fn from_service(
        service: &Service,
        namespace: &str,
        exposure: Exposure,
        node_ips: &[IpAddr],
    ) -> Result<Self> {
        let name = service.metadata.name.clone().unwrap_or_default();
        let port = service
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .and_then(|ports| ports.first())
            .context(error::MissingServicePortSnafu {
                service: name.as_str(),
            })?;
        match (exposure, node_ips.first()) {
            (Exposure::External, Some(node)) => {
                let node_port = port.node_port.context(error::MissingNodePortSnafu {
                    service: name.as_str(),
                })?;
                Self::external(*node, node_port)
            }
            _ => Self::cluster_internal(&name, namespace, port.port),
        }
    }

    fn parse(url: String) -> Result<Self> {
        Ok(Self {
            url: Url::parse(&url).context(error::UrlSnafu { url: url.as_str() })?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    pub fn port(&self) -> Option<u16> {
        self.url.port()
    }
}

impl Display for DeployedEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str().trim_end_matches('/'))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
    use kube::api::ObjectMeta;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn service(node_port: Option<i32>) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some("proxy".to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    port: 6443,
                    node_port,
                    ..ServicePort::default()
                }]),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        }
    }

    #[test]
    fn cluster_internal_pattern() {
        let endpoint = DeployedEndpoint::cluster_internal("probe", "e2e-abc", 6443).unwrap();
        assert_eq!(
            endpoint.to_string(),
            "https://probe.e2e-abc.svc.cluster.local:6443"
        );
        assert_eq!(endpoint.host(), Some("probe.e2e-abc.svc.cluster.local"));
        assert_eq!(endpoint.port(), Some(6443));
    }

    #[test]
    fn external_pattern() {
        let node = IpAddr::V4(Ipv4Addr::new(172, 18, 0, 2));
        let endpoint = DeployedEndpoint::external(node, 31443).unwrap();
        assert_eq!(endpoint.url().as_str(), "https://172.18.0.2:31443/");
        assert_eq!(endpoint.to_string(), "https://172.18.0.2:31443");
    }

    #[test]
    fn external_ipv6_is_bracketed() {
        let endpoint = DeployedEndpoint::external(IpAddr::V6(Ipv6Addr::LOCALHOST), 30000).unwrap();
        assert_eq!(endpoint.url().as_str(), "https://[::1]:30000/");
    }

    #[test]
    fn external_rejects_unusable_ports() {
        let node = IpAddr::V4(Ipv4Addr::new(172, 18, 0, 2));
        for port in [70000, -1, 0] {
            let err = DeployedEndpoint::external(node, port).unwrap_err();
            assert!(err.to_string().contains(&port.to_string()), "{}", err);
        }
        assert!(DeployedEndpoint::external(node, 65535).is_ok());
    }

    #[test]
    fn from_service_with_out_of_range_node_port() {
        let node = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
        assert!(DeployedEndpoint::from_service(
            &service(Some(70000)),
            "ns",
            Exposure::External,
            &[node]
        )
        .is_err());
    }

    #[test]
    fn from_external_service() {
        let node = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
        let endpoint =
            DeployedEndpoint::from_service(&service(Some(30123)), "ns", Exposure::External, &[node])
                .unwrap();
        assert_eq!(endpoint.url().as_str(), "https://10.0.0.7:30123/");
    }

    #[test]
    fn from_external_service_without_nodes() {
        let endpoint =
            DeployedEndpoint::from_service(&service(Some(30123)), "ns", Exposure::External, &[])
                .unwrap();
        assert_eq!(
            endpoint.url().as_str(),
            "https://proxy.ns.svc.cluster.local:6443/"
        );
    }

    #[test]
    fn external_service_requires_node_port() {
        let node = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
        assert!(
            DeployedEndpoint::from_service(&service(None), "ns", Exposure::External, &[node])
                .is_err()
        );
    }
}
