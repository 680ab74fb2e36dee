use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const TITLE_MAX_LENGTH: usize = 250;
pub const SUB_TITLE_MAX_LENGTH: usize = 500;
pub const GITHUB_MAX_LENGTH: usize = 250;
pub const DEFAULT_GITHUB: &str = "https://github.com/scottc11";

/// Number of body characters shown in post listings.
const SUMMARY_LENGTH: usize = 100;

/// A blog post stored in redb
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub title: String,
    pub sub_title: String,
    pub pub_date: DateTime<Utc>,
    /// Stored media name of the full-size image
    pub image: String,
    /// Stored media name of the thumbnail
    pub thumbnail: String,
    pub body: String,
    pub github: String,
}

/// Fields supplied when creating a post. Media names are filled in after upload.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub sub_title: String,
    pub pub_date: DateTime<Utc>,
    pub image: String,
    pub thumbnail: String,
    pub body: String,
    pub github: Option<String>,
}

impl NewPost {
    /// Check field lengths against the column limits.
    pub fn validate(&self) -> Result<(), String> {
        let checks = [
            ("title", &self.title, TITLE_MAX_LENGTH),
            ("sub_title", &self.sub_title, SUB_TITLE_MAX_LENGTH),
        ];
        for (field, value, max) in checks {
            if value.trim().is_empty() {
                return Err(format!("{field} must not be empty"));
            }
            if value.chars().count() > max {
                return Err(format!("{field} must be at most {max} characters"));
            }
        }
        if let Some(ref github) = self.github {
            if github.chars().count() > GITHUB_MAX_LENGTH {
                return Err(format!(
                    "github must be at most {GITHUB_MAX_LENGTH} characters"
                ));
            }
            if !github.starts_with("http://") && !github.starts_with("https://") {
                return Err("github must be an http(s) URL".to_string());
            }
        }
        Ok(())
    }

    pub fn into_post(self, id: u64) -> Post {
        Post {
            id,
            title: self.title,
            sub_title: self.sub_title,
            pub_date: self.pub_date,
            image: self.image,
            thumbnail: self.thumbnail,
            body: self.body,
            github: self.github.unwrap_or_else(|| DEFAULT_GITHUB.to_string()),
        }
    }
}

impl Post {
    /// Publication date as e.g. `Jul 10 2017` (day padded with a space).
    pub fn pub_date_pretty(&self) -> String {
        self.pub_date.format("%b %e %Y").to_string()
    }

    /// The first hundred characters of the body.
    pub fn summary(&self) -> String {
        self.body.chars().take(SUMMARY_LENGTH).collect()
    }
}

/// Upload path for post media: `<YYYY-MM-DD>/<filename>`.
pub fn format_storage_path(date: NaiveDate, filename: &str) -> String {
    format!("{}/{}", date.format("%Y-%m-%d"), filename)
}
