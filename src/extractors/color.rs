use super::{ExtractorError, PropertyExtractor};
use crate::models::property::{BlobProperty, PropertyValue};
use crate::processors::{color::ColorCluster, palette};

const SOURCE: &str = "color";
const MAX_COLORS: usize = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct ColorExtractor;

impl PropertyExtractor for ColorExtractor {
    fn name(&self) -> &'static str {
        SOURCE
    }

    /// `ProminentColorN` holds the cluster's `r,g,b`; `ColorCategoryN` the
    /// nearest palette name, with repeated names collapsed.
    fn extract(&self, content: &[u8]) -> Result<Vec<BlobProperty>, ExtractorError> {
        let clusters: Vec<ColorCluster> = serde_json::from_slice(content)?;
        let clusters = &clusters[..clusters.len().min(MAX_COLORS)];

        let mut props = Vec::with_capacity(clusters.len() * 2);
        for (i, cluster) in clusters.iter().enumerate() {
            let [r, g, b] = cluster.rgb;
            props.push(BlobProperty::new(
                SOURCE,
                format!("ProminentColor{}", i + 1),
                PropertyValue::Text(format!("{},{},{}", r, g, b)),
            ));
        }

        let mut categories: Vec<&'static str> = Vec::new();
        for cluster in clusters {
            let name = palette::nearest(cluster.rgb).0.name;
            if !categories.contains(&name) {
                categories.push(name);
            }
        }
        for (i, name) in categories.into_iter().enumerate() {
            props.push(BlobProperty::new(
                SOURCE,
                format!("ColorCategory{}", i + 1),
                PropertyValue::Text(name.to_string()),
            ));
        }

        Ok(props)
    }
}
