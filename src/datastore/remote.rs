use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{DatastoreError, JobEntity, JobKey, JobStore, NewJob, JOB_KIND, JOB_QUEUE_KIND};
use crate::cloud::auth::TokenProvider;

const API_BASE: &str = "https://datastore.googleapis.com/v1/projects";

/// Cloud Datastore (v1 REST) job store.
pub struct DatastoreClient {
    tokens: Arc<TokenProvider>,
    project_id: String,
    queue: String,
}

#[derive(Deserialize)]
struct BeginTransactionResponse {
    transaction: String,
}

#[derive(Deserialize)]
struct RunQueryResponse {
    batch: QueryBatch,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryBatch {
    #[serde(default)]
    entity_results: Vec<EntityResult>,
}

#[derive(Deserialize)]
struct EntityResult {
    entity: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    #[serde(default)]
    mutation_results: Vec<MutationResult>,
}

#[derive(Deserialize)]
struct MutationResult {
    #[serde(default)]
    key: Option<Value>,
}

impl DatastoreClient {
    pub fn new(tokens: Arc<TokenProvider>, project_id: &str, queue: &str) -> Self {
        Self {
            tokens,
            project_id: project_id.to_string(),
            queue: queue.to_string(),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: Value,
    ) -> Result<T, DatastoreError> {
        let token = self
            .tokens
            .token()
            .await
            .map_err(|e| DatastoreError::Backend(e.to_string()))?;

        let resp = self
            .tokens
            .http()
            .post(format!("{API_BASE}/{}:{method}", self.project_id))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| DatastoreError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DatastoreError::Backend(format!(
                "Datastore {method} failed ({status}): {body}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| DatastoreError::Backend(e.to_string()))
    }

    async fn begin(&self) -> Result<String, DatastoreError> {
        let resp: BeginTransactionResponse = self.call("beginTransaction", json!({})).await?;
        Ok(resp.transaction)
    }

    async fn rollback(&self, transaction: &str) {
        let result: Result<Value, _> = self
            .call("rollback", json!({ "transaction": transaction }))
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to roll back datastore transaction");
        }
    }

    async fn commit(
        &self,
        transaction: &str,
        mutation: Value,
    ) -> Result<CommitResponse, DatastoreError> {
        self.call(
            "commit",
            json!({
                "mode": "TRANSACTIONAL",
                "transaction": transaction,
                "mutations": [mutation],
            }),
        )
        .await
    }

    fn parent_key(&self) -> Value {
        json!({
            "partitionId": { "projectId": self.project_id },
            "path": [{ "kind": JOB_QUEUE_KIND, "name": self.queue }],
        })
    }

    /// Incomplete key for a new job; the id is allocated on commit.
    fn new_job_key(&self) -> Value {
        json!({
            "partitionId": { "projectId": self.project_id },
            "path": [{ "kind": JOB_QUEUE_KIND, "name": self.queue }, { "kind": JOB_KIND }],
        })
    }

    /// Raw `Job` entities under the queue whose `job_num` matches, read inside `transaction` if given.
    async fn query_job_num(
        &self,
        job_num: i64,
        transaction: Option<&str>,
    ) -> Result<Vec<Value>, DatastoreError> {
        let mut body = json!({
            "partitionId": { "projectId": self.project_id },
            "query": job_num_query(job_num, self.parent_key()),
        });
        if let Some(tx) = transaction {
            body["readOptions"] = json!({ "transaction": tx });
        }

        let resp: RunQueryResponse = self.call("runQuery", body).await?;
        Ok(resp
            .batch
            .entity_results
            .into_iter()
            .map(|r| r.entity)
            .collect())
    }

    /// Look up the single entity for `job_num` inside `transaction`, rolling back on failure.
    async fn lookup_one(&self, job_num: i64, transaction: &str) -> Result<Value, DatastoreError> {
        let result = self
            .query_job_num(job_num, Some(transaction))
            .await
            .and_then(|entities| single(job_num, entities));
        if result.is_err() {
            self.rollback(transaction).await;
        }
        result
    }
}

#[async_trait]
impl JobStore for DatastoreClient {
    async fn create(&self, job: &NewJob) -> Result<JobKey, DatastoreError> {
        let tx = self.begin().await?;

        let existing = match self.query_job_num(job.job_num, Some(&tx)).await {
            Ok(existing) => existing,
            Err(e) => {
                self.rollback(&tx).await;
                return Err(e);
            }
        };
        if !existing.is_empty() {
            self.rollback(&tx).await;
            return Err(DatastoreError::DuplicateJobNumber(job.job_num));
        }

        let entity = json!({
            "key": self.new_job_key(),
            "properties": job_properties(&JobEntity::from_new(0, job)),
        });
        let resp = self.commit(&tx, json!({ "insert": entity })).await?;

        let id = resp
            .mutation_results
            .first()
            .and_then(|r| r.key.as_ref())
            .and_then(key_id)
            .ok_or_else(|| DatastoreError::Backend("commit returned no key".to_string()))?;

        let key = JobKey {
            queue: self.queue.clone(),
            id,
        };
        tracing::info!(job_num = job.job_num, key = %key, "Created datastore job");
        Ok(key)
    }

    async fn find(&self, job_num: i64) -> Result<Option<JobEntity>, DatastoreError> {
        let entities = self.query_job_num(job_num, None).await?;
        if entities.is_empty() {
            return Ok(None);
        }
        entity_to_job(&single(job_num, entities)?).map(Some)
    }

    async fn update(&self, job_num: i64, status: &str) -> Result<JobEntity, DatastoreError> {
        let tx = self.begin().await?;
        let entity = self.lookup_one(job_num, &tx).await?;

        let updated = with_status(entity, status, Utc::now());
        let job = match entity_to_job(&updated) {
            Ok(job) => job,
            Err(e) => {
                self.rollback(&tx).await;
                return Err(e);
            }
        };
        self.commit(&tx, json!({ "update": updated })).await?;

        tracing::debug!(job_num, status, "Updated datastore job");
        Ok(job)
    }

    async fn remove(&self, job_num: i64) -> Result<(), DatastoreError> {
        let tx = self.begin().await?;
        let entity = self.lookup_one(job_num, &tx).await?;

        self.commit(&tx, json!({ "delete": entity["key"] })).await?;

        tracing::debug!(job_num, "Removed datastore job");
        Ok(())
    }
}

fn single<T>(job_num: i64, mut matches: Vec<T>) -> Result<T, DatastoreError> {
    match matches.len() {
        0 => Err(DatastoreError::EntityNotFound(job_num)),
        1 => Ok(matches.remove(0)),
        _ => Err(DatastoreError::DuplicateJobNumber(job_num)),
    }
}

/// The fetched entity with only `status` and `date` replaced. Every other
/// property is carried over, since an `update` mutation overwrites the whole entity.
fn with_status(mut entity: Value, status: &str, now: DateTime<Utc>) -> Value {
    let props = &mut entity["properties"];
    props["status"] = json!({ "stringValue": status });
    props["date"] = timestamp_value(now);
    entity
}

fn timestamp_value(date: DateTime<Utc>) -> Value {
    json!({ "timestampValue": date.to_rfc3339_opts(chrono::SecondsFormat::Micros, true) })
}

fn job_num_query(job_num: i64, ancestor: Value) -> Value {
    json!({
        "kind": [{ "name": JOB_KIND }],
        "filter": {
            "compositeFilter": {
                "op": "AND",
                "filters": [
                    { "propertyFilter": {
                        "property": { "name": "job_num" },
                        "op": "EQUAL",
                        "value": { "integerValue": job_num.to_string() },
                    }},
                    { "propertyFilter": {
                        "property": { "name": "__key__" },
                        "op": "HAS_ANCESTOR",
                        "value": { "keyValue": ancestor },
                    }},
                ],
            }
        },
    })
}

/// Entity properties; `files.filename` is a literal property name, not a nested path.
fn job_properties(job: &JobEntity) -> Value {
    json!({
        "date": timestamp_value(job.date),
        "email": { "stringValue": job.email },
        "job_num": { "integerValue": job.job_num.to_string() },
        "files.filename": { "stringValue": job.filename },
        "status": { "stringValue": job.status },
        "error": { "booleanValue": job.error },
    })
}

/// Id of the last path element of a key.
fn key_id(key: &Value) -> Option<i64> {
    key["path"].as_array()?.last()?["id"].as_str()?.parse().ok()
}

fn entity_to_job(entity: &Value) -> Result<JobEntity, DatastoreError> {
    let props = &entity["properties"];
    let missing = |name: &str| DatastoreError::Backend(format!("entity missing property {name}"));

    let string = |name: &str| -> Result<String, DatastoreError> {
        props[name]["stringValue"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| missing(name))
    };

    let date: DateTime<Utc> = props["date"]["timestampValue"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .ok_or_else(|| missing("date"))?;

    let job_num = props["job_num"]["integerValue"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| missing("job_num"))?;

    Ok(JobEntity {
        id: key_id(&entity["key"]).ok_or_else(|| missing("key"))?,
        date,
        email: string("email")?,
        job_num,
        filename: string("files.filename")?,
        status: string("status")?,
        error: props["error"]["booleanValue"].as_bool().unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> JobEntity {
        JobEntity {
            id: 5629499534213120,
            date: DateTime::parse_from_rfc3339("2017-07-10T23:43:00Z")
                .unwrap()
                .with_timezone(&Utc),
            email: "approver@example.com".to_string(),
            job_num: 42,
            filename: "protein.pdb".to_string(),
            status: "pending".to_string(),
            error: false,
        }
    }

    #[test]
    fn test_entity_properties_round_trip() {
        let job = sample();
        let entity = json!({
            "key": {
                "path": [
                    { "kind": JOB_QUEUE_KIND, "name": "Ligand_Express" },
                    { "kind": JOB_KIND, "id": "5629499534213120" },
                ]
            },
            "properties": job_properties(&job),
        });
        assert_eq!(entity_to_job(&entity).unwrap(), job);
    }

    #[test]
    fn test_filename_property_is_dotted() {
        let props = job_properties(&sample());
        assert_eq!(props["files.filename"]["stringValue"], "protein.pdb");
        assert_eq!(props["job_num"]["integerValue"], "42");
    }

    #[test]
    fn test_entity_missing_property() {
        let entity = json!({ "key": { "path": [] }, "properties": {} });
        assert!(matches!(
            entity_to_job(&entity),
            Err(DatastoreError::Backend(_))
        ));
    }

    #[test]
    fn test_single_match_rules() {
        assert!(matches!(
            single::<JobEntity>(42, vec![]),
            Err(DatastoreError::EntityNotFound(42))
        ));
        assert_eq!(single(42, vec![sample()]).unwrap().job_num, 42);
        assert!(matches!(
            single(42, vec![sample(), sample()]),
            Err(DatastoreError::DuplicateJobNumber(42))
        ));
    }

    #[test]
    fn test_status_update_keeps_unknown_properties() {
        let mut properties = job_properties(&sample());
        properties["result_uri"] = json!({ "stringValue": "gs://ligexprj/42/out.tar" });
        let entity = json!({
            "key": {
                "path": [
                    { "kind": JOB_QUEUE_KIND, "name": "Ligand_Express" },
                    { "kind": JOB_KIND, "id": "5629499534213120" },
                ]
            },
            "properties": properties,
        });

        let now = Utc::now();
        let updated = with_status(entity.clone(), "complete", now);
        let props = &updated["properties"];
        assert_eq!(props["result_uri"]["stringValue"], "gs://ligexprj/42/out.tar");
        assert_eq!(props["status"]["stringValue"], "complete");
        assert_eq!(props["email"], entity["properties"]["email"]);
        assert_eq!(props["files.filename"], entity["properties"]["files.filename"]);
        assert_eq!(updated["key"], entity["key"]);

        let job = entity_to_job(&updated).unwrap();
        assert_eq!(job.status, "complete");
        assert_eq!(job.date.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn test_query_filters_by_ancestor_and_job_num() {
        let query = job_num_query(42, json!({ "path": [] }));
        let filters = &query["filter"]["compositeFilter"]["filters"];
        assert_eq!(filters[0]["propertyFilter"]["value"]["integerValue"], "42");
        assert_eq!(filters[1]["propertyFilter"]["op"], "HAS_ANCESTOR");
    }
}
