use anyhow::Result;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;

use crate::config::CacheConfig;
use crate::llm::client::types::TokenUsage;

pub mod performance_monitor;
pub use performance_monitor::{CachePerformanceMonitor, CachePerformanceReport};

/// LLM响应缓存管理器
pub struct CacheManager {
    config: CacheConfig,
    performance_monitor: CachePerformanceMonitor,
}

/// 缓存条目
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: u64,
    /// prompt的MD5哈希值，用于缓存键的生成和验证
    pub prompt_hash: String,
    /// token使用情况（可选，用于统计节省量）
    pub token_usage: Option<TokenUsage>,
    /// 使用的模型名称（可选）
    pub model_name: Option<String>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            performance_monitor: CachePerformanceMonitor::new(),
        }
    }

    /// 生成prompt的MD5哈希
    pub fn hash_prompt(&self, prompt: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(prompt.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// 获取缓存文件路径
    fn get_cache_path(&self, category: &str, hash: &str) -> PathBuf {
        self.config
            .cache_dir
            .join(category)
            .join(format!("{}.json", hash))
    }

    /// 检查缓存是否过期
    fn is_expired(&self, timestamp: u64) -> bool {
        let expire_seconds = self.config.expire_hours * 3600;
        now_secs().saturating_sub(timestamp) > expire_seconds
    }

    /// 获取缓存
    pub async fn get<T>(&self, category: &str, prompt: &str) -> Result<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        if !self.config.enabled {
            return Ok(None);
        }

        let hash = self.hash_prompt(prompt);
        let cache_path = self.get_cache_path(category, &hash);

        if !cache_path.exists() {
            self.performance_monitor.record_cache_miss(category);
            return Ok(None);
        }

        match fs::read_to_string(&cache_path).await {
            Ok(content) => match serde_json::from_str::<CacheEntry<T>>(&content) {
                Ok(entry) => {
                    if self.is_expired(entry.timestamp) {
                        // 删除过期缓存
                        let _ = fs::remove_file(&cache_path).await;
                        self.performance_monitor.record_cache_miss(category);
                        return Ok(None);
                    }

                    self.performance_monitor
                        .record_cache_hit(category, entry.token_usage.unwrap_or_default());
                    Ok(Some(entry.data))
                }
                Err(e) => {
                    self.performance_monitor
                        .record_cache_error(category, &format!("反序列化失败: {}", e));
                    Ok(None)
                }
            },
            Err(e) => {
                self.performance_monitor
                    .record_cache_error(category, &format!("读取文件失败: {}", e));
                Ok(None)
            }
        }
    }

    /// 设置缓存
    pub async fn set<T>(&self, category: &str, prompt: &str, data: T) -> Result<()>
    where
        T: Serialize,
    {
        self.write_entry(category, prompt, data, None, None).await
    }

    /// 设置缓存（带token使用情况和模型名称）
    pub async fn set_with_tokens<T>(
        &self,
        category: &str,
        prompt: &str,
        data: T,
        token_usage: TokenUsage,
        model_name: &str,
    ) -> Result<()>
    where
        T: Serialize,
    {
        self.write_entry(
            category,
            prompt,
            data,
            Some(token_usage),
            Some(model_name.to_string()),
        )
        .await
    }

    async fn write_entry<T>(
        &self,
        category: &str,
        prompt: &str,
        data: T,
        token_usage: Option<TokenUsage>,
        model_name: Option<String>,
    ) -> Result<()>
    where
        T: Serialize,
    {
        if !self.config.enabled {
            return Ok(());
        }

        let hash = self.hash_prompt(prompt);
        let cache_path = self.get_cache_path(category, &hash);

        // 确保目录存在
        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let entry = CacheEntry {
            data,
            timestamp: now_secs(),
            prompt_hash: hash,
            token_usage,
            model_name,
        };

        match serde_json::to_string_pretty(&entry) {
            Ok(content) => match fs::write(&cache_path, content).await {
                Ok(_) => {
                    self.performance_monitor.record_cache_write(category);
                    Ok(())
                }
                Err(e) => {
                    self.performance_monitor
                        .record_cache_error(category, &format!("写入文件失败: {}", e));
                    Err(e.into())
                }
            },
            Err(e) => {
                self.performance_monitor
                    .record_cache_error(category, &format!("序列化失败: {}", e));
                Err(e.into())
            }
        }
    }

    /// 生成性能报告
    pub fn generate_performance_report(&self) -> CachePerformanceReport {
        self.performance_monitor.generate_report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir, enabled: bool, expire_hours: u64) -> CacheManager {
        CacheManager::new(CacheConfig {
            enabled,
            cache_dir: dir.path().to_path_buf(),
            expire_hours,
        })
    }

    #[test]
    fn test_hash_prompt_is_stable_md5() {
        let dir = TempDir::new().unwrap();
        let cache = manager(&dir, true, 1);
        assert_eq!(cache.hash_prompt(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(cache.hash_prompt("abc"), cache.hash_prompt("abc"));
    }

    #[tokio::test]
    async fn test_set_then_get_round_trip_and_report() {
        let dir = TempDir::new().unwrap();
        let cache = manager(&dir, true, 1);

        assert!(cache.get::<String>("extraction", "p1").await.unwrap().is_none());
        cache
            .set_with_tokens(
                "extraction",
                "p1",
                "reply".to_string(),
                TokenUsage::new(10, 5),
                "gpt-4o-mini",
            )
            .await
            .unwrap();
        let hit: Option<String> = cache.get("extraction", "p1").await.unwrap();
        assert_eq!(hit.as_deref(), Some("reply"));

        let report = cache.generate_performance_report();
        assert_eq!(report.cache_hits, 1);
        assert_eq!(report.cache_misses, 1);
        assert_eq!(report.cache_writes, 1);
        assert_eq!(report.input_tokens_saved, 10);
        assert_eq!(report.output_tokens_saved, 5);
        assert_eq!(report.hit_rate, 0.5);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_stores() {
        let dir = TempDir::new().unwrap();
        let cache = manager(&dir, false, 1);
        cache.set("extraction", "p", 1u32).await.unwrap();
        assert!(cache.get::<u32>("extraction", "p").await.unwrap().is_none());
        assert_eq!(cache.generate_performance_report().cache_writes, 0);
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed() {
        let dir = TempDir::new().unwrap();
        let cache = manager(&dir, true, 1);
        let hash = cache.hash_prompt("old");
        let path = dir.path().join("extraction").join(format!("{}.json", hash));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let stale = serde_json::json!({
            "data": "stale",
            "timestamp": 0,
            "prompt_hash": hash,
            "token_usage": null,
            "model_name": null
        });
        std::fs::write(&path, stale.to_string()).unwrap();

        assert!(cache.get::<String>("extraction", "old").await.unwrap().is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_entry_counts_as_error() {
        let dir = TempDir::new().unwrap();
        let cache = manager(&dir, true, 1);
        let hash = cache.hash_prompt("bad");
        let path = dir.path().join("extraction").join(format!("{}.json", hash));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        assert!(cache.get::<String>("extraction", "bad").await.unwrap().is_none());
        assert_eq!(cache.generate_performance_report().cache_errors, 1);
    }
}
