use crate::{
    error::Result,
    kv::{CasOutcome, KvClient},
};

/// `deliveries_index` / `drones_index` are plain `Vec<String>` documents listing every live id
/// of that kind, so the dispatcher's scans and the autoscaler's population counts have something
/// to enumerate without a KV range-scan primitive.
pub async fn register_index_entry(kv: &dyn KvClient, index_key: &str, id: &str) -> Result<()> {
    for _ in 0..10 {
        let current = kv.get(index_key).await?;
        let mut list: Vec<String> = match &current {
            Some(v) => serde_json::from_value(v.clone()).unwrap_or_default(),
            None => Vec::new(),
        };
        if list.iter().any(|existing| existing == id) {
            return Ok(());
        }
        list.push(id.to_string());
        let new_value = serde_json::to_value(&list)?;
        match kv.cas(index_key, current, new_value).await? {
            CasOutcome::Ok => return Ok(()),
            CasOutcome::Conflict { .. } => continue,
        }
    }
    Ok(())
}

pub async fn read_index(kv: &dyn KvClient, index_key: &str) -> Result<Vec<String>> {
    match kv.get(index_key).await? {
        Some(v) => Ok(serde_json::from_value(v).unwrap_or_default()),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKv;

    #[tokio::test]
    async fn register_is_idempotent() {
        let kv = InMemoryKv::new();
        register_index_entry(&kv, "drones_index", "d1").await.unwrap();
        register_index_entry(&kv, "drones_index", "d1").await.unwrap();
        register_index_entry(&kv, "drones_index", "d2").await.unwrap();
        let list = read_index(&kv, "drones_index").await.unwrap();
        assert_eq!(list, vec!["d1".to_string(), "d2".to_string()]);
    }
}
