use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_IMAGE_SIZE: u32 = 100;

fn default_image_size() -> u32 {
    DEFAULT_IMAGE_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageEntry {
    pub image_name: String,
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    #[serde(rename = "isLanding", default)]
    pub is_landing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SoundEntry {
    pub text: String,
    pub soundclip: String,
}

/// The per-game `data.json` document. Older manifests may lack either key,
/// so both sequences default to empty on deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    #[serde(default)]
    pub images: Vec<ImageEntry>,
    #[serde(default)]
    pub sounds: Vec<SoundEntry>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("image not found")]
    ImageNotFound,
    #[error("soundclip not found")]
    SoundclipNotFound,
}

/// Percent-decodes a path and strips it to its final component.
pub fn decoded_basename(name: &str) -> String {
    let decoded = percent_decode_str(name).decode_utf8_lossy();
    decoded.rsplit('/').next().unwrap_or_default().to_string()
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_image(&mut self, image_name: impl Into<String>) {
        self.images.push(ImageEntry {
            image_name: image_name.into(),
            image_size: DEFAULT_IMAGE_SIZE,
            is_landing: false,
        });
    }

    pub fn add_sound(&mut self, text: impl Into<String>, soundclip: impl Into<String>) {
        self.sounds.push(SoundEntry {
            text: text.into(),
            soundclip: soundclip.into(),
        });
    }

    /// Removes every image entry whose decoded basename matches the decoded
    /// basename of `image_name`. Matching ignores directory segments, so the
    /// caller can pass either a bare filename or a full URL path. Returns the
    /// number of entries removed.
    pub fn remove_image(&mut self, image_name: &str) -> usize {
        let target = decoded_basename(image_name);
        let before = self.images.len();
        self.images
            .retain(|img| decoded_basename(&img.image_name) != target);
        before - self.images.len()
    }

    /// Replaces the text of the first sound entry whose `soundclip` exactly
    /// equals the given value. Later entries with the same clip are untouched.
    pub fn update_sound_text(
        &mut self,
        soundclip: &str,
        new_text: impl Into<String>,
    ) -> Result<(), ManifestError> {
        let entry = self
            .sounds
            .iter_mut()
            .find(|s| s.soundclip == soundclip)
            .ok_or(ManifestError::SoundclipNotFound)?;
        entry.text = new_text.into();
        Ok(())
    }

    /// Updates the size and landing flag of the first image entry whose
    /// `image_name` exactly equals the given value. Setting `is_landing`
    /// clears the flag on every other entry in the same call, keeping at
    /// most one landing image. If no entry matches, nothing is modified.
    pub fn update_image(
        &mut self,
        image_name: &str,
        image_size: u32,
        is_landing: bool,
    ) -> Result<(), ManifestError> {
        let index = self
            .images
            .iter()
            .position(|img| img.image_name == image_name)
            .ok_or(ManifestError::ImageNotFound)?;

        self.images[index].image_size = image_size;
        self.images[index].is_landing = is_landing;

        if is_landing {
            for (i, img) in self.images.iter_mut().enumerate() {
                if i != index {
                    img.is_landing = false;
                }
            }
        }

        Ok(())
    }

    pub fn landing_image(&self) -> Option<&ImageEntry> {
        self.images.iter().find(|img| img.is_landing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str, landing: bool) -> ImageEntry {
        ImageEntry {
            image_name: name.to_string(),
            image_size: DEFAULT_IMAGE_SIZE,
            is_landing: landing,
        }
    }

    fn base_manifest() -> Manifest {
        Manifest {
            images: vec![
                image("/static/games/quiz/images/a.png", false),
                image("/static/games/quiz/images/b.png", true),
                image("/static/games/quiz/images/c.png", false),
            ],
            sounds: vec![
                SoundEntry {
                    text: "hello".into(),
                    soundclip: "/static/games/quiz/sounds/hi.mp3".into(),
                },
                SoundEntry {
                    text: "bye".into(),
                    soundclip: "/static/games/quiz/sounds/bye.mp3".into(),
                },
            ],
        }
    }

    #[test]
    fn add_image_appends_with_defaults() {
        let mut manifest = Manifest::new();
        manifest.add_image("/static/games/quiz/images/a.png");

        assert_eq!(manifest.images.len(), 1);
        assert_eq!(manifest.images[0].image_size, 100);
        assert!(!manifest.images[0].is_landing);
    }

    #[test]
    fn update_image_enforces_single_landing() {
        let mut manifest = base_manifest();
        manifest
            .update_image("/static/games/quiz/images/c.png", 75, true)
            .unwrap();

        let landing: Vec<&ImageEntry> =
            manifest.images.iter().filter(|i| i.is_landing).collect();
        assert_eq!(landing.len(), 1);
        assert_eq!(landing[0].image_name, "/static/games/quiz/images/c.png");
        assert_eq!(landing[0].image_size, 75);
    }

    #[test]
    fn update_image_can_clear_landing_flag() {
        let mut manifest = base_manifest();
        manifest
            .update_image("/static/games/quiz/images/b.png", 100, false)
            .unwrap();

        assert!(manifest.landing_image().is_none());
    }

    #[test]
    fn update_image_missing_target_leaves_manifest_untouched() {
        let mut manifest = base_manifest();
        let err = manifest
            .update_image("/static/games/quiz/images/missing.png", 50, true)
            .unwrap_err();

        assert_eq!(err, ManifestError::ImageNotFound);
        // The old landing flag survives the failed update.
        assert_eq!(
            manifest.landing_image().map(|i| i.image_name.as_str()),
            Some("/static/games/quiz/images/b.png")
        );
        assert_eq!(manifest, base_manifest());
    }

    #[test]
    fn remove_image_matches_on_decoded_basename() {
        let mut manifest = Manifest::new();
        manifest.add_image("/static/games/quiz/images/my%20pic.png");
        manifest.add_image("/static/games/quiz/images/other.png");

        let removed = manifest.remove_image("my pic.png");
        assert_eq!(removed, 1);
        assert_eq!(manifest.images.len(), 1);
        assert_eq!(
            manifest.images[0].image_name,
            "/static/games/quiz/images/other.png"
        );

        // A second removal finds nothing and changes nothing.
        assert_eq!(manifest.remove_image("my pic.png"), 0);
        assert_eq!(manifest.images.len(), 1);
    }

    #[test]
    fn remove_image_accepts_full_path_argument() {
        let mut manifest = Manifest::new();
        manifest.add_image("/static/games/quiz/images/a.png");

        assert_eq!(manifest.remove_image("/static/games/quiz/images/a.png"), 1);
        assert!(manifest.images.is_empty());
    }

    #[test]
    fn update_sound_text_touches_first_match_only() {
        let mut manifest = base_manifest();
        manifest.sounds.push(SoundEntry {
            text: "dup".into(),
            soundclip: "/static/games/quiz/sounds/hi.mp3".into(),
        });

        manifest
            .update_sound_text("/static/games/quiz/sounds/hi.mp3", "updated")
            .unwrap();

        assert_eq!(manifest.sounds[0].text, "updated");
        assert_eq!(manifest.sounds[2].text, "dup");
    }

    #[test]
    fn update_sound_text_unknown_clip_is_an_error() {
        let mut manifest = base_manifest();
        let err = manifest
            .update_sound_text("/static/games/quiz/sounds/nope.mp3", "x")
            .unwrap_err();
        assert_eq!(err, ManifestError::SoundclipNotFound);
        assert_eq!(manifest.sounds[0].text, "hello");
    }

    #[test]
    fn missing_keys_default_to_empty_sequences() {
        let manifest: Manifest = serde_json::from_str("{}").unwrap();
        assert!(manifest.images.is_empty());
        assert!(manifest.sounds.is_empty());

        let manifest: Manifest = serde_json::from_str(r#"{"sounds": []}"#).unwrap();
        assert!(manifest.images.is_empty());
    }

    #[test]
    fn entry_defaults_fill_missing_fields() {
        let manifest: Manifest = serde_json::from_str(
            r#"{"images": [{"image_name": "/static/games/quiz/images/a.png"}]}"#,
        )
        .unwrap();
        assert_eq!(manifest.images[0].image_size, 100);
        assert!(!manifest.images[0].is_landing);
    }

    #[test]
    fn serde_round_trip_preserves_entries() {
        let manifest = base_manifest();
        let json = serde_json::to_string_pretty(&manifest).unwrap();
        assert!(json.contains("isLanding"));

        let reparsed: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(reparsed, manifest);
    }
}
