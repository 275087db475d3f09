use anyhow::Result;
use aws_config::meta::region::RegionProviderChain;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client as S3Client,
};

use crate::config::S3Settings;

pub async fn build_client(settings: &S3Settings) -> Result<S3Client> {
    let region = Region::new(settings.region.clone());
    let region_provider = RegionProviderChain::first_try(Some(region))
        .or_default_provider()
        .or_else("us-east-1");

    let credentials = Credentials::new(
        settings.access_key_id.clone(),
        settings.secret_access_key.clone(),
        None,
        None,
        "oficios-env",
    );

    #[allow(deprecated)]
    let mut loader = aws_config::from_env()
        .region(region_provider)
        .credentials_provider(credentials);

    if let Some(endpoint) = &settings.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    let base_config = loader.load().await;
    let s3_config = S3ConfigBuilder::from(&base_config)
        .force_path_style(settings.endpoint_url.is_some())
        .build();

    Ok(S3Client::from_conf(s3_config))
}
