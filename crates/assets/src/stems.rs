use multitrack_engine::{CHANNEL_COUNT, ChannelIndex};
use serde::{Deserialize, Serialize};

/// Stems are required in two independent groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StemGroup {
    /// bass, drums, other, vocals
    Primary,
    Click,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stem {
    pub name: String,
    pub file_name: String,
    pub url: String,
    pub channel: ChannelIndex,
    pub group: StemGroup,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StemSetError {
    #[error("channel {0} is assigned to more than one stem")]
    DuplicateChannel(ChannelIndex),

    #[error("channel {0} has no stem")]
    MissingChannel(ChannelIndex),

    #[error("file name '{0}' is used by more than one stem")]
    DuplicateFile(String),
}

/// The fixed set of stem files a song needs, one per channel index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemSet {
    /// Sorted by channel; exactly one entry per index.
    stems: Vec<Stem>,
}

const STANDARD_STEMS: [(&str, StemGroup); CHANNEL_COUNT] = [
    ("bass", StemGroup::Primary),
    ("drums", StemGroup::Primary),
    ("other", StemGroup::Primary),
    ("vocals", StemGroup::Primary),
    ("click", StemGroup::Click),
];

impl StemSet {
    pub fn new(mut stems: Vec<Stem>) -> Result<Self, StemSetError> {
        stems.sort_by_key(|s| s.channel);

        for pair in stems.windows(2) {
            if pair[0].channel == pair[1].channel {
                return Err(StemSetError::DuplicateChannel(pair[0].channel));
            }
        }
        for channel in ChannelIndex::all() {
            if !stems.iter().any(|s| s.channel == channel) {
                return Err(StemSetError::MissingChannel(channel));
            }
        }
        for (i, stem) in stems.iter().enumerate() {
            if stems[..i].iter().any(|s| s.file_name == stem.file_name) {
                return Err(StemSetError::DuplicateFile(stem.file_name.clone()));
            }
        }

        Ok(Self { stems })
    }

    /// `bass`, `drums`, `other`, `vocals` and `click` as `.mp3` files on
    /// channels 0 through 4, each fetched from `{base_url}/{file_name}`.
    pub fn standard(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let stems = STANDARD_STEMS
            .iter()
            .zip(ChannelIndex::all())
            .map(|((name, group), channel)| {
                let file_name = format!("{name}.mp3");
                Stem {
                    name: name.to_string(),
                    url: format!("{base}/{file_name}"),
                    file_name,
                    channel,
                    group: *group,
                }
            })
            .collect();
        Self { stems }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stem> {
        self.stems.iter()
    }

    pub fn get(&self, channel: ChannelIndex) -> &Stem {
        // one entry per channel, sorted, so the index is the position
        &self.stems[channel.get()]
    }
}
