use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1hr")]
    OneHour,
    #[serde(rename = "4hr")]
    FourHours,
    #[serde(rename = "12hr")]
    TwelveHours,
    #[serde(rename = "24hr")]
    TwentyFourHours,
    #[serde(rename = "7d")]
    SevenDays,
}

impl TimeRange {
    pub fn seconds(&self) -> u64 {
        match self {
            Self::OneHour => 3600,
            Self::FourHours => 14400,
            Self::TwelveHours => 43200,
            Self::TwentyFourHours => 86400,
            Self::SevenDays => 604800,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OneHour => "1hr",
            Self::FourHours => "4hr",
            Self::TwelveHours => "12hr",
            Self::TwentyFourHours => "24hr",
            Self::SevenDays => "7d",
        }
    }

    /// Lower timestamp bound of this range relative to `now`
    pub fn since(&self, now: u64) -> u64 {
        now.saturating_sub(self.seconds())
    }
}
