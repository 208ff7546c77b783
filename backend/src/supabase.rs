use reqwest::{Client as HttpClient, RequestBuilder};
use url::Url;

/// Connection details shared by the PostgREST and Storage clients.
#[derive(Clone)]
pub struct SupabaseClient {
    http_client: HttpClient,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(http_client: HttpClient, base_url: &Url, service_key: String) -> Self {
        Self {
            http_client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            service_key,
        }
    }

    pub fn http(&self) -> &HttpClient {
        &self.http_client
    }

    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            bucket,
            encode_key(key)
        )
    }

    pub fn public_object_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            bucket,
            encode_key(key)
        )
    }

    /// Adds the service-role credentials every Supabase API expects.
    pub fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
