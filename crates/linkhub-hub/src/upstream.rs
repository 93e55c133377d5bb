use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::config::Config;
use crate::error::HubError;

/// Type-erased upstream transport: a plain `TcpStream` or a TLS stream
/// wrapping one, selected at dial time by `config.use_tls`.
pub type UpstreamStream = Box<dyn AsyncRead + AsyncWrite + Unpin + Send>;

/// Dial the upstream address from `config`, returning a plain or TLS
/// stream per `config.use_tls`/`config.tls_no_verify`.
pub async fn dial(config: &Config) -> Result<UpstreamStream, HubError> {
    let tcp = TcpStream::connect(&config.address)
        .await
        .map_err(|e| HubError::Connect(e.to_string()))?;

    if !config.use_tls {
        return Ok(Box::new(tcp));
    }

    let tls_config = build_tls_config(config.tls_no_verify)?;
    let connector = TlsConnector::from(Arc::new(tls_config));
    let host = config
        .address
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(&config.address);
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| HubError::Connect(format!("invalid TLS server name {host:?}: {e}")))?;
    let stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| HubError::Connect(e.to_string()))?;
    Ok(Box::new(stream))
}

fn build_tls_config(no_verify: bool) -> Result<ClientConfig, HubError> {
    if no_verify {
        return Ok(ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
            .with_no_client_auth());
    }

    let mut roots = RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs().map_err(|e| HubError::Connect(e.to_string()))? {
        let _ = roots.add(cert);
    }
    Ok(ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

/// Accepts any server certificate. Only constructed when
/// `config.tls_no_verify` is set — an explicit opt-in to a known-insecure
/// mode.
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

/// The ordered login sequence: optional capability
/// request, optional server password, NICK, USER, CAP END, optional
/// services password, then the configured auto-join and auto-run lines.
/// Pure and testable independent of any actual connection.
pub fn login_lines(config: &Config) -> Vec<String> {
    let mut lines = Vec::new();

    if config.cap_server_time {
        lines.push("CAP REQ :server-time".to_string());
    }
    if let Some(pass) = &config.server_password {
        if !pass.is_empty() {
            lines.push(format!("PASS :{pass}"));
        }
    }
    lines.push(format!("NICK {}", config.nickname));
    lines.push(format!("USER {} 0 * :{}", config.username, config.realname));
    if config.cap_server_time {
        lines.push("CAP END".to_string());
    }
    if let Some(pass) = &config.services_password {
        if !pass.is_empty() {
            lines.push(format!("PRIVMSG NickServ :IDENTIFY {pass}"));
        }
    }
    for channel in &config.auto_join {
        lines.push(format!("JOIN {channel}"));
    }
    for raw in &config.auto_run {
        lines.push(raw.clone());
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            address: "irc.example.com:6697".to_string(),
            username: "user".to_string(),
            nickname: "nick".to_string(),
            realname: "Real Name".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn minimal_login_sequence_has_no_cap_bracket() {
        let cfg = base_config();
        let lines = login_lines(&cfg);
        assert_eq!(
            lines,
            vec![
                "NICK nick".to_string(),
                "USER user 0 * :Real Name".to_string(),
            ]
        );
    }

    #[test]
    fn full_login_sequence_in_spec_order() {
        let mut cfg = base_config();
        cfg.server_password = Some("serverpass".to_string());
        cfg.cap_server_time = true;
        cfg.services_password = Some("nickservpass".to_string());
        cfg.auto_join = vec!["#a".to_string(), "#b".to_string()];
        cfg.auto_run = vec!["MODE nick +i".to_string()];

        let lines = login_lines(&cfg);
        assert_eq!(
            lines,
            vec![
                "CAP REQ :server-time".to_string(),
                "PASS :serverpass".to_string(),
                "NICK nick".to_string(),
                "USER user 0 * :Real Name".to_string(),
                "CAP END".to_string(),
                "PRIVMSG NickServ :IDENTIFY nickservpass".to_string(),
                "JOIN #a".to_string(),
                "JOIN #b".to_string(),
                "MODE nick +i".to_string(),
            ]
        );
    }
}
