use crate::container::ImageRef;
use crate::errors::*;
use crate::http;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;

pub const QUAY_PREFIX: &str = "quay.io/";
pub const DOCKER_HUB_SERVICE: &str = "registry.docker.io";
pub const MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DIGEST_HEADER: &str = "Docker-Content-Digest";

/// Base urls of the registry apis used for digest lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub quay: String,
    pub docker_auth: String,
    pub docker_registry: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            quay: "https://quay.io".to_string(),
            docker_auth: "https://auth.docker.io".to_string(),
            docker_registry: "https://registry-1.docker.io".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuayTagList {
    tags: Vec<QuayTag>,
}

#[derive(Debug, Deserialize)]
struct QuayTag {
    manifest_digest: String,
}

#[derive(Debug, Deserialize)]
struct DockerToken {
    access_token: Option<String>,
    token: Option<String>,
}

impl DockerToken {
    fn into_token(self) -> Option<String> {
        self.access_token.or(self.token)
    }
}

fn validate_digest(digest: &str) -> Result<()> {
    let (algorithm, hex) = digest
        .split_once(':')
        .with_context(|| anyhow!("Digest is missing an algorithm: {digest:?}"))?;
    if algorithm.is_empty() || !algorithm.chars().all(|c| c.is_ascii_alphanumeric()) {
        bail!("Unexpected digest algorithm: {digest:?}");
    }
    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("Unexpected characters in digest: {digest:?}");
    }
    Ok(())
}

pub struct Resolver {
    client: http::Client,
    endpoints: Endpoints,
}

impl Resolver {
    pub fn new(endpoints: Endpoints) -> Result<Self> {
        let client = http::Client::new()?;
        Ok(Resolver { client, endpoints })
    }

    /// Look up the digest `tag` currently points to and pin `image` to it.
    ///
    /// The tag is dropped from the returned reference, `quay.io/` images keep
    /// their registry host.
    pub async fn resolve(&self, image: &str) -> Result<String> {
        let mut image_ref = image.parse::<ImageRef>()?;
        if image_ref.digest.is_some() {
            debug!("Image reference is already pinned: {image:?}");
            return Ok(image.to_string());
        }
        let tag = image_ref.tag_or_default().to_string();

        let digest = if let Some(repo) = image_ref.repo.strip_prefix(QUAY_PREFIX) {
            self.quay_digest(repo, &tag)
                .await
                .with_context(|| anyhow!("Failed to retrieve digest from quay.io for {repo}:{tag}"))?
        } else {
            self.docker_hub_digest(&image_ref.repo, &tag)
                .await
                .with_context(|| {
                    anyhow!(
                        "Failed to retrieve digest from docker hub for {}:{tag}",
                        image_ref.repo
                    )
                })?
        };
        validate_digest(&digest)?;

        image_ref.tag = None;
        image_ref.digest = Some(digest);
        let pinned_image = image_ref.to_string();
        info!("Resolved image reference {:?} to {:?}", image, pinned_image);
        Ok(pinned_image)
    }

    pub async fn quay_digest(&self, repo: &str, tag: &str) -> Result<String> {
        let url = format!(
            "{}/api/v1/repository/{}/tag/?specificTag={}",
            self.endpoints.quay,
            repo,
            urlencoding::encode(tag)
        );
        let buf = self.client.fetch(&url).await?;
        let list = serde_json::from_slice::<QuayTagList>(&buf)
            .context("Failed to parse quay.io tag list")?;
        trace!("Received quay.io tag list: {list:?}");

        let tag = list
            .tags
            .into_iter()
            .next()
            .with_context(|| anyhow!("No tag {tag:?} found for {repo:?}"))?;
        Ok(tag.manifest_digest)
    }

    pub async fn docker_hub_digest(&self, repo: &str, tag: &str) -> Result<String> {
        let repo = if repo.contains('/') {
            repo.to_string()
        } else {
            format!("library/{repo}")
        };

        let url = format!(
            "{}/token?service={}&scope={}",
            self.endpoints.docker_auth,
            DOCKER_HUB_SERVICE,
            urlencoding::encode(&format!("repository:{repo}:pull"))
        );
        let buf = self
            .client
            .fetch(&url)
            .await
            .context("Failed to request anonymous token")?;
        let token = serde_json::from_slice::<DockerToken>(&buf)
            .context("Failed to parse token response")?
            .into_token()
            .context("Token response did not contain a token")?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .context("Received token is not a valid header value")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(MANIFEST_V2));

        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.endpoints.docker_registry, repo, tag
        );
        let response = self.client.request(&url, headers).await?;
        let digest = response
            .headers()
            .get(DIGEST_HEADER)
            .with_context(|| anyhow!("Manifest response is missing {DIGEST_HEADER:?} header"))?
            .to_str()
            .context("Digest header is not valid utf-8")?;
        Ok(digest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SAMTOOLS_DIGEST: &str =
        "sha256:97b9627711c16125fe1b57cf8745396064fd88ebeff6ab00cf6a68aeacecfcda";
    const CPAT_DIGEST: &str =
        "sha256:6ee77007a59b331a31203ac68c20855230f3e64be550ace88645c63550060b90";

    fn resolver(server: &MockServer) -> Resolver {
        Resolver::new(Endpoints {
            quay: server.uri(),
            docker_auth: server.uri(),
            docker_registry: server.uri(),
        })
        .unwrap()
    }

    async fn mock_quay(server: &MockServer, repo: &str, tag: &str, digest: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/repository/{repo}/tag/")))
            .and(query_param("specificTag", tag))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "has_additional": false,
                "page": 1,
                "tags": [{
                    "name": tag,
                    "reversion": false,
                    "manifest_digest": digest,
                    "is_manifest_list": false,
                }]
            })))
            .mount(server)
            .await;
    }

    async fn mock_docker_hub(server: &MockServer, repo: &str, tag: &str, digest: &str) {
        Mock::given(method("GET"))
            .and(path("/token"))
            .and(query_param("service", "registry.docker.io"))
            .and(query_param("scope", format!("repository:{repo}:pull")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "abc",
                "access_token": "abc",
                "expires_in": 300,
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/v2/{repo}/manifests/{tag}")))
            .and(header("Authorization", "Bearer abc"))
            .and(header("Accept", MANIFEST_V2))
            .respond_with(ResponseTemplate::new(200).insert_header(DIGEST_HEADER, digest))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_quay_digest() -> Result<()> {
        let server = MockServer::start().await;
        mock_quay(&server, "biocontainers/samtools", "1.2-0", SAMTOOLS_DIGEST).await;

        let digest = resolver(&server)
            .quay_digest("biocontainers/samtools", "1.2-0")
            .await?;
        assert_eq!(digest, SAMTOOLS_DIGEST);
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_quay() -> Result<()> {
        let server = MockServer::start().await;
        mock_quay(&server, "biocontainers/samtools", "1.2-0", SAMTOOLS_DIGEST).await;

        let image = resolver(&server)
            .resolve("quay.io/biocontainers/samtools:1.2-0")
            .await?;
        assert_eq!(image, format!("quay.io/biocontainers/samtools@{SAMTOOLS_DIGEST}"));
        Ok(())
    }

    #[tokio::test]
    async fn test_quay_empty_tag_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/repository/biocontainers/samtools/tag/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tags": []
            })))
            .mount(&server)
            .await;

        let r = resolver(&server)
            .resolve("quay.io/biocontainers/samtools:0.0.0")
            .await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn test_quay_missing_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/repository/biocontainers/samtools/tag/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tags": [{ "name": "1.2-0" }]
            })))
            .mount(&server)
            .await;

        let r = resolver(&server)
            .quay_digest("biocontainers/samtools", "1.2-0")
            .await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn test_quay_not_found() {
        let server = MockServer::start().await;
        let r = resolver(&server)
            .resolve("quay.io/biocontainers/samtools:1.2-0")
            .await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn test_docker_hub_digest() -> Result<()> {
        let server = MockServer::start().await;
        mock_docker_hub(&server, "biocontainers/cpat", "v1.2.4_cv2", CPAT_DIGEST).await;

        let digest = resolver(&server)
            .docker_hub_digest("biocontainers/cpat", "v1.2.4_cv2")
            .await?;
        assert_eq!(digest, CPAT_DIGEST);
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_docker_hub_official_image() -> Result<()> {
        let server = MockServer::start().await;
        mock_docker_hub(&server, "library/debian", "latest", CPAT_DIGEST).await;

        let image = resolver(&server).resolve("debian").await?;
        assert_eq!(image, format!("debian@{CPAT_DIGEST}"));
        Ok(())
    }

    #[tokio::test]
    async fn test_docker_hub_token_only_field() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "abc",
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/biocontainers/cpat/manifests/v1.2.4_cv2"))
            .and(header("Authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).insert_header(DIGEST_HEADER, CPAT_DIGEST))
            .mount(&server)
            .await;

        let image = resolver(&server)
            .resolve("biocontainers/cpat:v1.2.4_cv2")
            .await?;
        assert_eq!(image, format!("biocontainers/cpat@{CPAT_DIGEST}"));
        Ok(())
    }

    #[tokio::test]
    async fn test_docker_hub_missing_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "expires_in": 300,
            })))
            .mount(&server)
            .await;

        let r = resolver(&server)
            .docker_hub_digest("biocontainers/cpat", "v1.2.4_cv2")
            .await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn test_docker_hub_missing_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "abc",
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/biocontainers/cpat/manifests/v1.2.4_cv2"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let r = resolver(&server)
            .docker_hub_digest("biocontainers/cpat", "v1.2.4_cv2")
            .await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn test_docker_hub_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let r = resolver(&server).resolve("biocontainers/cpat:v1.2.4_cv2").await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn test_reject_invalid_digest() {
        let server = MockServer::start().await;
        mock_quay(&server, "biocontainers/samtools", "1.2-0", "not a digest").await;

        let r = resolver(&server)
            .resolve("quay.io/biocontainers/samtools:1.2-0")
            .await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn test_resolve_pinned_image() -> Result<()> {
        let server = MockServer::start().await;
        let pinned = format!("biocontainers/cpat@{CPAT_DIGEST}");
        let image = resolver(&server).resolve(&pinned).await?;
        assert_eq!(image, pinned);
        Ok(())
    }

    #[test]
    fn test_validate_digest() {
        assert!(validate_digest(SAMTOOLS_DIGEST).is_ok());
        assert!(validate_digest("sha256:").is_err());
        assert!(validate_digest("97b9627711c1").is_err());
        assert!(validate_digest("sha256:xyz").is_err());
    }
}
