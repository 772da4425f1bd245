use crate::color::{self, Level};
use crate::container::Puller;
use crate::errors::*;
use crate::manifest::ImageList;
use crate::resolver::Resolver;
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub image: String,
    pub pulled: bool,
}

#[derive(Debug, Default, PartialEq)]
pub struct Summary {
    pub outcomes: Vec<Outcome>,
    pub stopped_early: bool,
}

impl Summary {
    pub fn success(&self) -> bool {
        !self.stopped_early && self.outcomes.iter().all(|o| o.pulled)
    }

    pub fn num_pulled(&self) -> usize {
        self.outcomes.iter().filter(|o| o.pulled).count()
    }
}

pub struct Prepull {
    pub puller: Puller,
    /// Pin tags to digests before pulling, if set
    pub resolver: Option<Resolver>,
    pub stop_on_failure: bool,
}

impl Prepull {
    pub async fn load_images(path: &Path) -> Result<Vec<String>> {
        let buf = fs::read_to_string(path)
            .await
            .with_context(|| anyhow!("Failed to read image list: {path:?}"))?;
        let images = ImageList::deserialize(&buf)
            .and_then(ImageList::into_images)
            .with_context(|| anyhow!("Invalid image list: {path:?}"))?;
        debug!("Loaded {} images from {path:?}", images.len());
        Ok(images)
    }

    async fn process(&self, image: &str) -> Result<bool> {
        let image = match &self.resolver {
            Some(resolver) if !image.contains('@') => match resolver.resolve(image).await {
                Ok(pinned) => pinned,
                Err(err) => {
                    println!(
                        "{}",
                        color::paint(
                            format_args!("Couldn't retrieve digest for '{image}': {err:#}"),
                            Level::Failure,
                        )
                    );
                    return Ok(false);
                }
            },
            _ => image.to_string(),
        };
        let report = self.puller.pull(&image).await?;
        Ok(report.success())
    }

    /// Resolve and pull every image in order.
    pub async fn run(&self, images: &[String]) -> Result<Summary> {
        let mut summary = Summary::default();
        for image in images {
            let pulled = self.process(image).await?;
            summary.outcomes.push(Outcome {
                image: image.to_string(),
                pulled,
            });
            if self.stop_on_failure && !pulled {
                warn!("Stopping after failure, skipping remaining images");
                summary.stopped_early = summary.outcomes.len() < images.len();
                return Ok(summary);
            }
        }
        Ok(summary)
    }

    pub async fn run_file(&self, path: &Path) -> Result<Summary> {
        let images = Self::load_images(path).await?;
        let summary = self.run(&images).await?;
        info!(
            "Pulled {} of {} images",
            summary.num_pulled(),
            summary.outcomes.len()
        );
        Ok(summary)
    }
}
