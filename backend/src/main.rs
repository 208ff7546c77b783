mod classifier;
mod config;
mod db;
mod download;
mod error;
mod payload;
mod relay;
mod routes;
mod storage;
mod supabase;
#[cfg(test)]
mod testing;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client as S3Client;
use classifier::http_classifier::HttpClassifier;
use config::{Config, StoreConfig};
use db::dynamodb_repository::DynamoDbRepository;
use db::supabase_repository::SupabaseRepository;
use db::RecordStore;
use download::HttpImageFetcher;
use relay::RelayService;
use routes::{configure_routes, UploadLimit};
use std::sync::Arc;
use storage::s3_service::S3Service;
use storage::supabase_storage::SupabaseStorage;
use storage::ObjectStore;
use supabase::SupabaseClient;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    let config = Config::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;
    log::info!("Loaded configuration: {:?}", config);

    let http_client = reqwest::Client::new();

    let (records, objects): (Arc<dyn RecordStore>, Arc<dyn ObjectStore>) = match &config.store {
        StoreConfig::Supabase {
            url,
            service_key,
            bucket,
        } => {
            let supabase = SupabaseClient::new(http_client.clone(), url, service_key.clone());
            log::info!("Using Supabase store at {}", url);
            (
                Arc::new(SupabaseRepository::new(supabase.clone())),
                Arc::new(SupabaseStorage::new(supabase, bucket.clone())),
            )
        }
        StoreConfig::Aws {
            region,
            bucket,
            public_base_url,
            captured_table,
            labeled_table,
        } => {
            let aws_config = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.clone()))
                .load()
                .await;
            log::info!("Using AWS store in {} (bucket {})", region, bucket);
            (
                Arc::new(DynamoDbRepository::new(
                    DynamoDbClient::new(&aws_config),
                    captured_table.clone(),
                    labeled_table.clone(),
                )),
                Arc::new(S3Service::new(
                    S3Client::new(&aws_config),
                    bucket.clone(),
                    region,
                    public_base_url.clone(),
                )),
            )
        }
    };

    let fetcher = Arc::new(HttpImageFetcher::new(
        http_client.clone(),
        config.download_timeout,
        config.max_upload_bytes,
    ));
    let classifier = Arc::new(HttpClassifier::new(
        http_client,
        config.model_url.clone(),
        config.model_api_token.clone(),
        config.model_request_format,
        config.classifier_timeout,
    ));

    let relay = web::Data::new(RelayService::new(
        fetcher,
        classifier,
        records,
        objects,
        config.persistence_mode,
        config.queue_capacity,
    ));
    let upload_limit = web::Data::new(UploadLimit(config.max_upload_bytes));

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    let server_relay = relay.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(server_relay.clone())
            .app_data(upload_limit.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    log::info!("Server stopped, flushing pending persistence jobs");
    relay.queue().drain().await;
    Ok(())
}
