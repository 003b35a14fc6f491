use crate::error::{self, Result};
use log::trace;
use rcgen::{
    string::Ia5String, BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use snafu::ResultExt;
use std::fmt::{Debug, Formatter};
use std::net::IpAddr;

/// Serving certificate and private key for a deployed workload.
///
/// The certificate is issued by a throwaway CA generated alongside it, so a client only needs to
/// trust [`KeyBundle::ca_pem`] to talk to the workload. `cert_pem` holds the serving certificate
/// followed by the CA, matching what TLS servers expect in a `cert.pem` file.
#[derive(Clone)]
pub struct KeyBundle {
    host: String,
    ips: Vec<IpAddr>,
    cert_pem: String,
    key_pem: String,
    ca_pem: String,
    cert_der: Vec<u8>,
    ca_der: Vec<u8>,
}

impl KeyBundle {
    /// Generate fresh key material valid for `host` and every address in `ips`.
    pub fn new_self_signed(host: &str, ips: &[IpAddr]) -> Result<Self> {
        trace!("generating key bundle for '{}' {:?}", host, ips);
        let dns_name = Ia5String::try_from(host.to_string())
            .context(error::InvalidHostSnafu { host })?;

        let mut ca_params = CertificateParams::default();
        ca_params.distinguished_name = distinguished_name(&format!("{}-ca", host));
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        let ca_key = KeyPair::generate().context(error::KeyGenerationSnafu)?;
        let ca_cert = ca_params
            .self_signed(&ca_key)
            .context(error::CertificateSnafu { host })?;

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(host);
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.subject_alt_names = std::iter::once(SanType::DnsName(dns_name))
            .chain(ips.iter().map(|ip| SanType::IpAddress(*ip)))
            .collect();
        let key = KeyPair::generate().context(error::KeyGenerationSnafu)?;

        let issuer = Issuer::new(ca_params, ca_key);
        let cert = params
            .signed_by(&key, &issuer)
            .context(error::CertificateSnafu { host })?;

        Ok(Self {
            host: host.to_string(),
            ips: ips.to_vec(),
            cert_pem: format!("{}{}", cert.pem(), ca_cert.pem()),
            key_pem: key.serialize_pem(),
            ca_pem: ca_cert.pem(),
            cert_der: cert.der().to_vec(),
            ca_der: ca_cert.der().to_vec(),
        })
    }

    /// The DNS name the bundle was issued for.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The IP addresses the bundle was issued for.
    pub fn ips(&self) -> &[IpAddr] {
        &self.ips
    }

    /// The serving certificate chain, PEM encoded.
    pub fn cert_pem(&self) -> &[u8] {
        self.cert_pem.as_bytes()
    }

    /// The serving private key, PEM encoded.
    pub fn key_pem(&self) -> &[u8] {
        self.key_pem.as_bytes()
    }

    /// The issuing CA certificate, PEM encoded.
    pub fn ca_pem(&self) -> &[u8] {
        self.ca_pem.as_bytes()
    }

    /// The serving certificate alone, DER encoded.
    pub fn cert_der(&self) -> &[u8] {
        &self.cert_der
    }

    /// The issuing CA certificate, DER encoded.
    pub fn ca_der(&self) -> &[u8] {
        &self.ca_der
    }
}

impl Debug for KeyBundle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBundle")
            .field("host", &self.host)
            .field("ips", &self.ips)
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    dn
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::Ipv4Addr;

    const CERT_HEADER: &str = "-----BEGIN CERTIFICATE-----";

    #[test]
    fn bundle_contains_chain_and_key() {
        let ip = IpAddr::V4(Ipv4Addr::new(172, 18, 0, 2));
        let bundle = KeyBundle::new_self_signed("proxy.e2e.svc.cluster.local", &[ip]).unwrap();
        let cert = String::from_utf8(bundle.cert_pem().to_vec()).unwrap();
        assert_eq!(cert.matches(CERT_HEADER).count(), 2);
        assert!(cert.ends_with(std::str::from_utf8(bundle.ca_pem()).unwrap()));
        assert!(std::str::from_utf8(bundle.key_pem())
            .unwrap()
            .contains("PRIVATE KEY"));
        assert!(!bundle.ca_der().is_empty());
        assert_eq!(bundle.ips(), &[ip]);
        assert_eq!(bundle.host(), "proxy.e2e.svc.cluster.local");
    }

    #[test]
    fn bundles_are_fresh() {
        let a = KeyBundle::new_self_signed("issuer", &[]).unwrap();
        let b = KeyBundle::new_self_signed("issuer", &[]).unwrap();
        assert_ne!(a.key_pem(), b.key_pem());
    }

    #[test]
    fn debug_redacts_private_key() {
        let bundle = KeyBundle::new_self_signed("issuer", &[]).unwrap();
        let debug = format!("{:?}", bundle);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("PRIVATE KEY"));
    }

    /// Verify the serving certificate of `bundle` for `name` the way kube's TLS stack does.
    fn verify(bundle: &KeyBundle, name: &str) -> std::result::Result<(), rustls::Error> {
        use rustls::client::danger::ServerCertVerifier;
        use rustls::client::WebPkiServerVerifier;
        use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
        use rustls::RootCertStore;
        use std::sync::Arc;

        let mut roots = RootCertStore::empty();
        roots
            .add(CertificateDer::from(bundle.ca_der().to_vec()))
            .unwrap();
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .unwrap();
        let server_name = ServerName::try_from(name.to_string()).unwrap();
        verifier
            .verify_server_cert(
                &CertificateDer::from(bundle.cert_der().to_vec()),
                &[],
                &server_name,
                &[],
                UnixTime::now(),
            )
            .map(|_| ())
    }

    #[test]
    fn node_ip_passes_client_verification() {
        let ip = IpAddr::V4(Ipv4Addr::new(172, 18, 0, 2));
        let bundle = KeyBundle::new_self_signed("proxy.e2e.svc.cluster.local", &[ip]).unwrap();
        verify(&bundle, "172.18.0.2").unwrap();
        verify(&bundle, "proxy.e2e.svc.cluster.local").unwrap();
    }

    #[test]
    fn unlisted_ip_fails_client_verification() {
        let ip = IpAddr::V4(Ipv4Addr::new(172, 18, 0, 2));
        let bundle = KeyBundle::new_self_signed("proxy.e2e.svc.cluster.local", &[ip]).unwrap();
        assert!(verify(&bundle, "172.18.0.3").is_err());
        assert!(verify(&bundle, "other.e2e.svc.cluster.local").is_err());
    }

    #[test]
    fn rejects_invalid_host() {
        assert!(KeyBundle::new_self_signed("bad host\u{7f}ñ", &[]).is_err());
    }
}
