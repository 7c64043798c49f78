//! Data category selection.
//!
//! Decides whether a file inside a browser profile belongs to one of the
//! enabled data categories. Browsers that share an on-disk layout are grouped
//! into an [`ApplicationFamily`], and each family has its own pattern table.

use derive_more::Display;
use getset::CopyGetters;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Copy, Debug, Display, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    #[display("bookmarks")]
    Bookmarks,
    #[display("history")]
    History,
    #[display("passwords")]
    Passwords,
    #[display("extensions")]
    Extensions,
    #[display("cookies")]
    Cookies,
    #[display("preferences")]
    Preferences,
}

impl DataCategory {
    pub const ALL: [DataCategory; 6] = [
        DataCategory::Bookmarks,
        DataCategory::History,
        DataCategory::Passwords,
        DataCategory::Extensions,
        DataCategory::Cookies,
        DataCategory::Preferences,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.to_string().eq_ignore_ascii_case(name.trim()))
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum ApplicationFamily {
    #[display("chrome_based")]
    ChromeBased,
    #[display("firefox")]
    Firefox,
    #[display("opera")]
    Opera,
}

impl ApplicationFamily {
    /// Unrecognised names fall back to the Chromium layout, which most browsers share.
    pub fn classify(application_id: &str) -> Self {
        let lower = application_id.to_lowercase();
        if lower.contains("firefox") {
            ApplicationFamily::Firefox
        } else if lower.contains("opera") {
            ApplicationFamily::Opera
        } else {
            ApplicationFamily::ChromeBased
        }
    }

    /// Patterns ending in `/*` name a directory; everything else is matched as a substring.
    pub fn patterns(self, category: DataCategory) -> &'static [&'static str] {
        use ApplicationFamily::*;
        use DataCategory::*;
        match (self, category) {
            (ChromeBased | Opera, Bookmarks) => &["Bookmarks", "Bookmarks.bak"],
            (ChromeBased | Opera, History) => &["History", "Visited Links"],
            (ChromeBased | Opera, Passwords) => &["Login Data", "Login Data-journal"],
            (ChromeBased | Opera, Extensions) => &["Extensions/*"],
            (ChromeBased | Opera, Cookies) => &["Cookies", "Cookies-journal"],
            (ChromeBased, Preferences) => &["Preferences", "Secure Preferences"],
            (Opera, Preferences) => &["Preferences", "GX Settings"],
            (Firefox, Bookmarks) => &["places.sqlite", "bookmarkbackups/*"],
            (Firefox, History) => &["places.sqlite", "places.sqlite-wal"],
            (Firefox, Passwords) => &["logins.json", "key4.db"],
            (Firefox, Extensions) => &["extensions/*", "extensions.json"],
            (Firefox, Cookies) => &["cookies.sqlite"],
            (Firefox, Preferences) => &["prefs.js", "user.js"],
        }
    }
}

/// Enabled flags per [`DataCategory`]. A category missing from a config file is enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, CopyGetters)]
#[serde(default)]
#[getset(get_copy = "pub")]
pub struct DataCategories {
    bookmarks: bool,
    history: bool,
    passwords: bool,
    extensions: bool,
    cookies: bool,
    preferences: bool,
}

impl Default for DataCategories {
    fn default() -> Self {
        Self::all(true)
    }
}

impl DataCategories {
    pub fn all(enabled: bool) -> Self {
        Self {
            bookmarks: enabled,
            history: enabled,
            passwords: enabled,
            extensions: enabled,
            cookies: enabled,
            preferences: enabled,
        }
    }

    pub fn only<I: IntoIterator<Item = DataCategory>>(categories: I) -> Self {
        let mut selected = Self::all(false);
        categories.into_iter().for_each(|c| selected.set(c, true));
        selected
    }

    pub fn is_enabled(&self, category: DataCategory) -> bool {
        match category {
            DataCategory::Bookmarks => self.bookmarks,
            DataCategory::History => self.history,
            DataCategory::Passwords => self.passwords,
            DataCategory::Extensions => self.extensions,
            DataCategory::Cookies => self.cookies,
            DataCategory::Preferences => self.preferences,
        }
    }

    pub fn set(&mut self, category: DataCategory, enabled: bool) {
        let flag = match category {
            DataCategory::Bookmarks => &mut self.bookmarks,
            DataCategory::History => &mut self.history,
            DataCategory::Passwords => &mut self.passwords,
            DataCategory::Extensions => &mut self.extensions,
            DataCategory::Cookies => &mut self.cookies,
            DataCategory::Preferences => &mut self.preferences,
        };
        *flag = enabled;
    }

    pub fn enabled(&self) -> impl Iterator<Item = DataCategory> + '_ {
        DataCategory::ALL.into_iter().filter(|c| self.is_enabled(*c))
    }

    pub fn none_enabled(&self) -> bool {
        self.enabled().next().is_none()
    }
}

/// Category filter bound to one application.
#[derive(Clone, Copy, Debug, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct FileSelector {
    family: ApplicationFamily,
    categories: DataCategories,
}

impl FileSelector {
    pub fn new(application_id: &str, categories: DataCategories) -> Self {
        Self {
            family: ApplicationFamily::classify(application_id),
            categories,
        }
    }

    pub fn should_include<P: AsRef<Path>>(&self, relative_path: P) -> bool {
        should_include(relative_path, self.family, &self.categories)
    }
}

/// Nothing selected means everything is selected.
pub fn should_include<P: AsRef<Path>>(
    relative_path: P,
    family: ApplicationFamily,
    categories: &DataCategories,
) -> bool {
    if categories.none_enabled() {
        return true;
    }

    let path = relative_path.as_ref().to_string_lossy();
    categories.enabled().any(|category| {
        family.patterns(category).iter().any(|pattern| {
            let needle = pattern.strip_suffix("/*").unwrap_or(pattern);
            path.contains(needle)
        })
    })
}
