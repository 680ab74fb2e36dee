use axum::extract::{Multipart, Path, State};
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppQuery, JSend, JSendPaginated, Pagination};
use crate::storage::models::{format_storage_path, NewPost, Post};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub body: String,
    pub github: String,
    pub id: u64,
    pub image: String,
    pub image_url: String,
    pub pub_date: String,
    pub pub_date_pretty: String,
    pub sub_title: String,
    pub summary: String,
    pub thumbnail: String,
    pub thumbnail_url: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ListPostsParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    20
}

/// An uploaded media field: client file name plus content.
struct MediaUpload {
    file_name: String,
    data: Bytes,
}

// ============================================================================
// Handlers
// ============================================================================

/// Home page: posts, newest first.
pub async fn home(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ListPostsParams>,
) -> Result<Json<JSendPaginated<PostResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let posts = state.db.list_posts()?;
    let pagination = Pagination {
        limit: params.limit,
        offset: params.offset,
        total: posts.len() as u64,
    };

    let mut items = Vec::new();
    for post in &posts[pagination.window()] {
        items.push(post_to_response(&state, post).await?);
    }

    Ok(JSendPaginated::success(items, pagination))
}

pub async fn post_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<JSend<PostResponse>>, ApiError> {
    let post = state
        .db
        .get_post(id)?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

    Ok(JSend::success(post_to_response(&state, &post).await?))
}

pub async fn create_post(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<JSend<PostResponse>>, ApiError> {
    let mut title: Option<String> = None;
    let mut sub_title: Option<String> = None;
    let mut pub_date: Option<DateTime<Utc>> = None;
    let mut body: Option<String> = None;
    let mut github: Option<String> = None;
    let mut image: Option<MediaUpload> = None;
    let mut thumbnail: Option<MediaUpload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "image" | "thumbnail" => {
                let file_name = field
                    .file_name()
                    .map(|s| s.to_string())
                    .ok_or_else(|| ApiError::bad_request(format!("{field_name} needs a file name")))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read {field_name}: {e}")))?;

                if data.len() as u64 > state.config.max_upload_size {
                    return Err(ApiError::payload_too_large(format!(
                        "File exceeds maximum upload size of {} bytes",
                        state.config.max_upload_size
                    )));
                }

                let upload = MediaUpload { file_name, data };
                if field_name == "image" {
                    image = Some(upload);
                } else {
                    thumbnail = Some(upload);
                }
            }
            "pub_date" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid pub_date: {e}")))?;
                let parsed = DateTime::parse_from_rfc3339(text.trim()).map_err(|e| {
                    ApiError::bad_request(format!("pub_date must be an RFC 3339 timestamp: {e}"))
                })?;
                pub_date = Some(parsed.with_timezone(&Utc));
            }
            "title" | "sub_title" | "body" | "github" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid {field_name}: {e}")))?;
                match field_name.as_str() {
                    "title" => title = Some(text),
                    "sub_title" => sub_title = Some(text),
                    "body" => body = Some(text),
                    _ => github = Some(text).filter(|g| !g.trim().is_empty()),
                }
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let image = image.ok_or_else(|| ApiError::bad_request("image field is required"))?;
    let thumbnail =
        thumbnail.ok_or_else(|| ApiError::bad_request("thumbnail field is required"))?;

    let mut new_post = NewPost {
        title: title.ok_or_else(|| ApiError::bad_request("title field is required"))?,
        sub_title: sub_title.ok_or_else(|| ApiError::bad_request("sub_title field is required"))?,
        pub_date: pub_date.unwrap_or_else(Utc::now),
        image: String::new(),
        thumbnail: String::new(),
        body: body.unwrap_or_default(),
        github,
    };
    new_post.validate().map_err(ApiError::bad_request)?;

    // Phase 1: Upload media
    new_post.image = store_media(&state, image).await?;
    new_post.thumbnail = match store_media(&state, thumbnail).await {
        Ok(name) => name,
        Err(e) => {
            discard_media(&state, &[new_post.image.as_str()]).await;
            return Err(e);
        }
    };

    // Phase 2: Write the post record
    let (image_name, thumbnail_name) = (new_post.image.clone(), new_post.thumbnail.clone());
    let post = match state.db.insert_post(new_post) {
        Ok(post) => post,
        Err(e) => {
            discard_media(&state, &[image_name.as_str(), thumbnail_name.as_str()]).await;
            return Err(e.into());
        }
    };

    tracing::debug!(post_id = post.id, image = %post.image, "Created post");
    Ok(JSend::success(post_to_response(&state, &post).await?))
}

pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<JSend<()>>, ApiError> {
    let post = state
        .db
        .delete_post(id)?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

    // Media removal is best-effort once the record is gone
    discard_media(&state, &[post.image.as_str(), post.thumbnail.as_str()]).await;

    tracing::debug!(post_id = id, "Deleted post");
    Ok(JSend::success(()))
}

// ============================================================================
// Helpers
// ============================================================================

/// Best-effort media removal; failures are logged and leave the blob behind.
async fn discard_media(state: &AppState, names: &[&str]) {
    for name in names {
        if let Err(e) = state.media.delete(name).await {
            tracing::warn!(media = %name, error = %e, "Failed to delete post media");
        }
    }
}

/// Save an uploaded media file under today's date directory and return its stored name.
async fn store_media(state: &AppState, upload: MediaUpload) -> Result<String, ApiError> {
    let file_name = upload
        .file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    if file_name.is_empty() {
        return Err(ApiError::bad_request("file name must not be empty"));
    }

    let upload_path = format_storage_path(Local::now().date_naive(), &file_name);
    let name = state
        .media
        .get_available_name(&upload_path, Some(state.config.media.max_name_length))
        .await?;

    Ok(state.media.save(&name, upload.data).await?)
}

async fn post_to_response(state: &AppState, post: &Post) -> Result<PostResponse, ApiError> {
    let image_url = state.media.url(&post.image).await?;
    let thumbnail_url = state.media.url(&post.thumbnail).await?;

    Ok(PostResponse {
        body: post.body.clone(),
        github: post.github.clone(),
        id: post.id,
        image: post.image.clone(),
        image_url,
        pub_date: post.pub_date.to_rfc3339(),
        pub_date_pretty: post.pub_date_pretty(),
        sub_title: post.sub_title.clone(),
        summary: post.summary(),
        thumbnail: post.thumbnail.clone(),
        thumbnail_url,
        title: post.title.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MISSING_URL;
    use crate::testutil::test_state;
    use axum::http::StatusCode;

    async fn seed_post(state: &AppState, title: &str) -> Post {
        let image = store_media(
            state,
            MediaUpload {
                file_name: "C:\\Users\\me\\cat.png".to_string(),
                data: Bytes::from("png"),
            },
        )
        .await
        .unwrap();

        state
            .db
            .insert_post(NewPost {
                title: title.to_string(),
                sub_title: "sub".to_string(),
                pub_date: Utc::now(),
                image,
                thumbnail: "science/missing-thumb.png".to_string(),
                body: "body".to_string(),
                github: None,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_media_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;

        let upload = || MediaUpload {
            file_name: "cat.png".to_string(),
            data: Bytes::from("png"),
        };
        let first = store_media(&state, upload()).await.unwrap();
        let second = store_media(&state, upload()).await.unwrap();

        assert!(first.starts_with("science/"));
        assert!(first.ends_with("/cat.png"));
        assert_ne!(first, second);
        assert!(state.media.exists(&second).await.unwrap());
    }

    #[tokio::test]
    async fn test_discard_media_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let kept = store_media(
            &state,
            MediaUpload {
                file_name: "dog.png".to_string(),
                data: Bytes::from("png"),
            },
        )
        .await
        .unwrap();

        // The first name is rejected by the local bucket; the second is still removed
        assert!(state.media.delete("../bad.png").await.is_err());
        discard_media(&state, &["../bad.png", kept.as_str()]).await;
        assert!(!state.media.exists(&kept).await.unwrap());
    }

    #[tokio::test]
    async fn test_post_detail_includes_media_urls() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let post = seed_post(&state, "First").await;

        let Json(resp) = post_detail(State(Arc::clone(&state)), Path(post.id))
            .await
            .unwrap();
        assert_eq!(resp.data.title, "First");
        assert!(resp.data.image.ends_with("/cat.png"));
        assert_ne!(resp.data.image_url, MISSING_URL);
        assert_eq!(resp.data.thumbnail_url, MISSING_URL);
    }

    #[tokio::test]
    async fn test_home_paginates() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        for title in ["a", "b", "c"] {
            seed_post(&state, title).await;
        }

        let Json(resp) = home(
            State(Arc::clone(&state)),
            AppQuery(ListPostsParams {
                limit: 2,
                offset: 0,
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.data.items.len(), 2);
        assert_eq!(resp.data.pagination.total, 3);
    }

    #[tokio::test]
    async fn test_delete_post_removes_media() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let post = seed_post(&state, "Gone").await;
        assert!(state.media.exists(&post.image).await.unwrap());

        delete_post(State(Arc::clone(&state)), Path(post.id))
            .await
            .unwrap();
        assert!(!state.media.exists(&post.image).await.unwrap());

        let err = post_detail(State(state), Path(post.id)).await.unwrap_err();
        assert!(matches!(err, ApiError::Fail(StatusCode::NOT_FOUND, _)));
    }
}
