//! PostgREST-style table queries
//!
//! ```ignore
//! let posts: Vec<Post> = rest
//!     .from("posts")
//!     .select("*, user:users(id, name, image), postLikes(*), comments(count)")
//!     .order("created_at", false)
//!     .limit(10)
//!     .fetch()
//!     .await?;
//! ```

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::client::ProjectClient;
use crate::error::AppError;

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Entry point for table queries
#[derive(Clone)]
pub struct RestClient {
    client: ProjectClient,
}

impl RestClient {
    pub fn new(client: ProjectClient) -> Self {
        Self { client }
    }

    /// Start a query against `table`
    pub fn from(&self, table: &str) -> QueryBuilder {
        QueryBuilder {
            client: self.client.clone(),
            table: table.to_string(),
            params: Vec::new(),
        }
    }
}

/// One query against one table
pub struct QueryBuilder {
    client: ProjectClient,
    table: String,
    params: Vec<(String, String)>,
}

impl QueryBuilder {
    /// Columns and embedded resources; whitespace is stripped
    pub fn select(mut self, columns: &str) -> Self {
        let columns: String = columns.chars().filter(|c| !c.is_whitespace()).collect();
        self.params.push(("select".to_string(), columns));
        self
    }

    /// `column = value`
    pub fn eq(mut self, column: &str, value: impl std::fmt::Display) -> Self {
        self.params
            .push((column.to_string(), format!("eq.{value}")));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.params
            .push(("order".to_string(), order_value(column, ascending)));
        self
    }

    /// Order rows of an embedded resource (e.g. a post's comments)
    pub fn order_embedded(mut self, resource: &str, column: &str, ascending: bool) -> Self {
        self.params
            .push((format!("{resource}.order"), order_value(column, ascending)));
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.params.push(("limit".to_string(), count.to_string()));
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Query-string pairs built so far
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    fn path(&self) -> String {
        format!("/rest/v1/{}", self.table)
    }

    fn request(&self, method: Method) -> reqwest::RequestBuilder {
        self.client
            .request(method, &self.path())
            .query(&self.params)
    }

    /// All matching rows
    pub async fn fetch<T: DeserializeOwned>(self) -> Result<Vec<T>, AppError> {
        let method = Method::GET;
        let builder = self.request(method.clone());
        let response = self.client.send(builder, &method, &self.table).await?;
        Ok(response.json().await?)
    }

    /// Exactly one row; zero rows is `AppError::NotFound`
    pub async fn single<T: DeserializeOwned>(self) -> Result<T, AppError> {
        let method = Method::GET;
        let builder = self
            .request(method.clone())
            .header(reqwest::header::ACCEPT, SINGLE_OBJECT);
        let response = self.client.send(builder, &method, &self.table).await?;
        Ok(response.json().await?)
    }

    /// Insert one row and return it as stored
    pub async fn insert<B, T>(self, row: &B) -> Result<T, AppError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.write_returning(row, "return=representation").await
    }

    /// Insert or update (by primary key) one row and return it as stored
    pub async fn upsert<B, T>(self, row: &B) -> Result<T, AppError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.write_returning(row, "resolution=merge-duplicates,return=representation")
            .await
    }

    async fn write_returning<B, T>(self, row: &B, prefer: &str) -> Result<T, AppError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let method = Method::POST;
        let builder = self
            .request(method.clone())
            .header(reqwest::header::ACCEPT, SINGLE_OBJECT)
            .header("Prefer", prefer)
            .json(row);
        let response = self.client.send(builder, &method, &self.table).await?;
        Ok(response.json().await?)
    }

    /// Patch all matching rows
    pub async fn update<B: Serialize + ?Sized>(self, changes: &B) -> Result<(), AppError> {
        let method = Method::PATCH;
        let builder = self
            .request(method.clone())
            .header("Prefer", "return=minimal")
            .json(changes);
        self.client.send(builder, &method, &self.table).await?;
        Ok(())
    }

    /// Delete all matching rows
    pub async fn delete(self) -> Result<(), AppError> {
        let method = Method::DELETE;
        let builder = self.request(method.clone());
        self.client.send(builder, &method, &self.table).await?;
        Ok(())
    }
}

fn order_value(column: &str, ascending: bool) -> String {
    format!("{column}.{}", if ascending { "asc" } else { "desc" })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rest() -> RestClient {
        RestClient::new(ProjectClient::with_http(
            reqwest::Client::new(),
            "https://p.example.com",
            "anon",
        ))
    }

    #[test]
    fn feed_query_params() {
        let query = rest()
            .from("posts")
            .select("*, user: users (id, name, image), postLikes(*), comments (count)")
            .eq("userId", "u-1")
            .order("created_at", false)
            .limit(11);

        assert_eq!(query.table(), "posts");
        assert_eq!(
            query.params(),
            &[
                (
                    "select".to_string(),
                    "*,user:users(id,name,image),postLikes(*),comments(count)".to_string()
                ),
                ("userId".to_string(), "eq.u-1".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "11".to_string()),
            ]
        );
    }

    #[test]
    fn embedded_order_is_prefixed() {
        let query = rest()
            .from("posts")
            .eq("id", 4)
            .order_embedded("comments", "created_at", false);
        assert_eq!(
            query.params()[1],
            ("comments.order".to_string(), "created_at.desc".to_string())
        );
    }
}
