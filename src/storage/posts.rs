use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::{NewPost, Post};
use super::tables::*;

impl Database {
    // ========================================================================
    // Post operations
    // ========================================================================

    /// Store a new post under a freshly allocated id
    pub fn insert_post(&self, post: NewPost) -> Result<Post, DatabaseError> {
        let write_txn = self.begin_write()?;
        let post = {
            let id = Database::next_id(&write_txn, "posts")?;
            let post = post.into_post(id);
            let mut table = write_txn.open_table(POSTS)?;
            let data = rmp_serde::to_vec_named(&post)?;
            table.insert(id, data.as_slice())?;
            post
        };
        write_txn.commit()?;
        Ok(post)
    }

    /// Get a post by id
    pub fn get_post(&self, id: u64) -> Result<Option<Post>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(POSTS)?;

        match table.get(id)? {
            Some(data) => {
                let post: Post = rmp_serde::from_slice(data.value())?;
                Ok(Some(post))
            }
            None => Ok(None),
        }
    }

    /// All posts, newest publication date first
    pub fn list_posts(&self) -> Result<Vec<Post>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(POSTS)?;

        let mut posts = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let post: Post = rmp_serde::from_slice(value.value())?;
            posts.push(post);
        }

        posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        Ok(posts)
    }

    /// Delete a post, returning it so its media can be cleaned up
    pub fn delete_post(&self, id: u64) -> Result<Option<Post>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(POSTS)?;
            let result = match table.remove(id)? {
                Some(data) => Some(rmp_serde::from_slice::<Post>(data.value())?),
                None => None,
            };
            result
        };
        write_txn.commit()?;
        Ok(removed)
    }
}
