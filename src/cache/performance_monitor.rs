use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::llm::client::types::TokenUsage;

/// 缓存性能监控器
#[derive(Clone, Default)]
pub struct CachePerformanceMonitor {
    metrics: Arc<CacheMetrics>,
}

/// 缓存指标
#[derive(Default)]
struct CacheMetrics {
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    cache_writes: AtomicUsize,
    cache_errors: AtomicUsize,
    /// 命中缓存而省下的输入token数量
    input_tokens_saved: AtomicUsize,
    /// 命中缓存而省下的输出token数量
    output_tokens_saved: AtomicUsize,
    /// 分类统计数据：category -> (hits, misses)
    category_metrics: RwLock<BTreeMap<String, (usize, usize)>>,
}

/// 缓存性能报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePerformanceReport {
    /// 缓存命中率
    pub hit_rate: f64,
    /// 总缓存查询次数
    pub total_operations: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_writes: usize,
    pub cache_errors: usize,
    pub input_tokens_saved: usize,
    pub output_tokens_saved: usize,
    /// 分类统计
    pub category_stats: BTreeMap<String, CategoryPerformanceStats>,
}

/// 分类性能统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryPerformanceStats {
    pub hits: usize,
    pub misses: usize,
    pub hit_rate: f64,
}

fn ratio(part: usize, total: usize) -> f64 {
    if total > 0 {
        part as f64 / total as f64
    } else {
        0.0
    }
}

impl CachePerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_category(&self, category: &str, hit: bool) {
        if let Ok(mut category_map) = self.metrics.category_metrics.write() {
            let entry = category_map.entry(category.to_string()).or_default();
            if hit {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
        }
    }

    /// 记录缓存命中
    pub fn record_cache_hit(&self, category: &str, token_usage: TokenUsage) {
        self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .input_tokens_saved
            .fetch_add(token_usage.input_tokens, Ordering::Relaxed);
        self.metrics
            .output_tokens_saved
            .fetch_add(token_usage.output_tokens, Ordering::Relaxed);
        self.bump_category(category, true);

        tracing::debug!(
            category,
            input_tokens = token_usage.input_tokens,
            output_tokens = token_usage.output_tokens,
            "💰 cache hit"
        );
    }

    /// 记录缓存未命中
    pub fn record_cache_miss(&self, category: &str) {
        self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
        self.bump_category(category, false);
        tracing::debug!(category, "⌛ cache miss");
    }

    /// 记录缓存写入
    pub fn record_cache_write(&self, category: &str) {
        self.metrics.cache_writes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(category, "💾 cache write");
    }

    /// 记录缓存错误
    pub fn record_cache_error(&self, category: &str, error: &str) {
        self.metrics.cache_errors.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(category, error, "❌ cache error");
    }

    /// 生成性能报告
    pub fn generate_report(&self) -> CachePerformanceReport {
        let hits = self.metrics.cache_hits.load(Ordering::Relaxed);
        let misses = self.metrics.cache_misses.load(Ordering::Relaxed);

        let category_stats = self
            .metrics
            .category_metrics
            .read()
            .map(|category_map| {
                category_map
                    .iter()
                    .map(|(category, (cat_hits, cat_misses))| {
                        (
                            category.clone(),
                            CategoryPerformanceStats {
                                hits: *cat_hits,
                                misses: *cat_misses,
                                hit_rate: ratio(*cat_hits, cat_hits + cat_misses),
                            },
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        CachePerformanceReport {
            hit_rate: ratio(hits, hits + misses),
            total_operations: hits + misses,
            cache_hits: hits,
            cache_misses: misses,
            cache_writes: self.metrics.cache_writes.load(Ordering::Relaxed),
            cache_errors: self.metrics.cache_errors.load(Ordering::Relaxed),
            input_tokens_saved: self.metrics.input_tokens_saved.load(Ordering::Relaxed),
            output_tokens_saved: self.metrics.output_tokens_saved.load(Ordering::Relaxed),
            category_stats,
        }
    }
}
