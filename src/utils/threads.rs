use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// 并发执行一组future，同时运行的数量不超过 `max_concurrency`，结果保持输入顺序
pub async fn do_parallel_with_limit<F, T>(futures: Vec<F>, max_concurrency: usize) -> Vec<T>
where
    F: Future<Output = T>,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));

    let limited = futures.into_iter().map(|future| {
        let semaphore = semaphore.clone();
        async move {
            // 信号量不会被关闭，acquire只可能成功
            let _permit = semaphore.acquire().await;
            future.await
        }
    });

    join_all(limited).await
}
