use serde::{Deserialize, Serialize};

// ============================================================================
// Catalog Image Variants
// ============================================================================
//
// Catalog images are served from a CDN bucket holding pre-sized copies under
// img512/img256/img128/img64/img32. PNG files are only stored at full size.
//
// ============================================================================

pub const DEFAULT_CDN_PREFIX: &str = "https://rulo-katalog.s3.amazonaws.com";

const SIZES: [&str; 5] = ["img512", "img256", "img128", "img64", "img32"];

/// Size served as the default `image` of a catalog entry.
const DEFAULT_SIZE: &str = "img256";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageVariants {
    /// Default display size.
    pub image: String,
    /// URL as stored in the catalog.
    pub image_full: String,
    pub img512: String,
    pub img256: String,
    pub img128: String,
    pub img64: String,
    pub img32: String,
}

impl ImageVariants {
    /// Rewrite a stored image URL into its CDN size variants. Empty URLs have
    /// no variants.
    pub fn from_url(prefix: &str, url: &str) -> Option<Self> {
        if url.is_empty() {
            return None;
        }

        let [img512, img256, img128, img64, img32] = SIZES.map(|size| sized_url(prefix, url, size));
        Some(Self {
            image: sized_url(prefix, url, DEFAULT_SIZE),
            image_full: url.to_string(),
            img512,
            img256,
            img128,
            img64,
            img32,
        })
    }
}

/// URL of one size of `url`. PNG files resolve to the unsized copy.
pub fn sized_url(prefix: &str, url: &str, size: &str) -> String {
    let file_name = url.rsplit('/').next().unwrap_or(url);
    let extension = file_name.rsplit('.').next().unwrap_or(file_name);
    let prefix = prefix.trim_end_matches('/');

    if extension == "png" {
        format!("{}/{}", prefix, file_name)
    } else {
        format!("{}/{}/{}", prefix, size, file_name)
    }
}
