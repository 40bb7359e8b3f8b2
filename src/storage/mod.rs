//! Object-storage helpers for product images. The bucket lives on an
//! S3-compatible endpoint; keys follow `{machine_id}/Inventory/product_images/{filename}`.

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use log::info;

use crate::config::DriveConfig;

pub async fn init_drive(config: &DriveConfig) -> Result<S3Client, anyhow::Error> {
    let endpoint = if !config.server.ends_with('/') {
        format!("{}/", config.server)
    } else {
        config.server.clone()
    };

    let base_config = aws_config::defaults(BehaviorVersion::latest())
        .endpoint_url(endpoint)
        .region(aws_sdk_s3::config::Region::new("auto"))
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        ))
        .load()
        .await;

    let s3_config = S3ConfigBuilder::from(&base_config)
        .force_path_style(true)
        .build();

    Ok(S3Client::from_conf(s3_config))
}

pub fn image_object_key(machine_id: &str, filename: &str) -> String {
    format!("{}/Inventory/product_images/{}", machine_id, filename)
}

pub fn public_object_url(drive: &DriveConfig, key: &str) -> String {
    format!(
        "{}/{}/{}",
        drive.server.trim_end_matches('/'),
        drive.bucket,
        key
    )
}

/// Extracts the storage key out of a previously issued public URL.
/// Returns `None` for URLs that do not point into the configured bucket.
pub fn object_key_from_url(drive: &DriveConfig, url: &str) -> Option<String> {
    let marker = format!("/{}/", drive.bucket);
    url.find(&marker)
        .map(|idx| url[idx + marker.len()..].to_string())
        .filter(|key| !key.is_empty())
}

/// Bundled placeholder images are shared across tenants and must never be
/// deleted when a product row is updated or removed.
pub fn is_default_image(drive: &DriveConfig, url: &str) -> bool {
    url.ends_with("/product_img/download.png") || !url.contains(&format!("/{}/", drive.bucket))
}

pub async fn upload_object(
    s3: &S3Client,
    bucket: &str,
    key: &str,
    data: Vec<u8>,
    content_type: &str,
) -> Result<(), anyhow::Error> {
    s3.put_object()
        .bucket(bucket)
        .key(key)
        .body(ByteStream::from(data))
        .content_type(content_type)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("put_object failed: {}", e))?;
    info!("Uploaded object: {}/{}", bucket, key);
    Ok(())
}

pub async fn object_exists(s3: &S3Client, bucket: &str, key: &str) -> bool {
    s3.head_object().bucket(bucket).key(key).send().await.is_ok()
}

pub async fn delete_object(
    s3: &S3Client,
    bucket: &str,
    key: &str,
) -> Result<(), anyhow::Error> {
    s3.delete_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("delete_object failed: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive() -> DriveConfig {
        DriveConfig {
            server: "http://localhost:9000".to_string(),
            access_key: "test".to_string(),
            secret_key: "test".to_string(),
            bucket: "product-images".to_string(),
        }
    }

    #[test]
    fn object_key_layout_is_tenant_scoped() {
        assert_eq!(
            image_object_key("VM-001", "abc123.png"),
            "VM-001/Inventory/product_images/abc123.png"
        );
    }

    #[test]
    fn public_url_round_trips_to_key() {
        let d = drive();
        let key = image_object_key("VM-001", "abc123.png");
        let url = public_object_url(&d, &key);
        assert_eq!(url, "http://localhost:9000/product-images/VM-001/Inventory/product_images/abc123.png");
        assert_eq!(object_key_from_url(&d, &url).as_deref(), Some(key.as_str()));
    }

    #[test]
    fn foreign_urls_yield_no_key() {
        let d = drive();
        assert_eq!(object_key_from_url(&d, "https://example.com/img.png"), None);
        assert_eq!(object_key_from_url(&d, "http://localhost:9000/product-images/"), None);
    }

    #[test]
    fn default_placeholders_are_protected() {
        let d = drive();
        assert!(is_default_image(&d, "/product_img/download.png"));
        assert!(is_default_image(&d, "https://cdn.example.com/other.png"));
        assert!(!is_default_image(
            &d,
            "http://localhost:9000/product-images/VM-001/Inventory/product_images/a.png"
        ));
    }
}
