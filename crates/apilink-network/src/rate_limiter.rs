//! 토큰 버킷 레이트 리미터.
//!
//! 버킷 용량(`token_limit`)만큼 즉시 허용하고, 나머지 요청은 제한된 대기열에
//! 들어가 보충 주기마다 오래된 순서로 해제된다.
//! 대기 중 취소된 요청은 토큰을 소비하지 않는다.

use apilink_core::config::RateLimiterConfig;
use apilink_core::error::CoreError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// 입장 결과
#[derive(Debug)]
pub enum Admission {
    /// 토큰 획득, 즉시 실행
    Permit,
    /// 대기열 등록, 토큰 보충 시 해제
    Queued(Waiter),
    /// 대기열 초과
    Rejected,
}

struct QueuedEntry {
    id: u64,
    tx: oneshot::Sender<()>,
}

struct BucketState {
    tokens: u32,
    queue: VecDeque<QueuedEntry>,
    next_id: u64,
}

struct LimiterInner {
    config: RateLimiterConfig,
    state: Mutex<BucketState>,
}

impl LimiterInner {
    /// 토큰 보충 후 대기열 앞쪽부터 해제
    fn replenish(&self) {
        let mut state = self.state.lock();
        state.tokens = state
            .tokens
            .saturating_add(self.config.tokens_per_period)
            .min(self.config.token_limit);

        let mut released = 0u32;
        while state.tokens > 0 {
            let Some(entry) = state.queue.pop_front() else {
                break;
            };
            // 수신측이 사라진 대기자는 토큰 없이 건너뜀
            if entry.tx.send(()).is_ok() {
                state.tokens -= 1;
                released += 1;
            }
        }

        if released > 0 {
            debug!(
                "레이트 리미터 대기열 해제: {}건 (남은 대기 {}건)",
                released,
                state.queue.len()
            );
        }
    }

    fn remove_waiter(&self, id: u64) {
        let mut state = self.state.lock();
        state.queue.retain(|entry| entry.id != id);
    }

    /// 사용되지 않은 토큰 반환
    fn return_token(&self) {
        let mut state = self.state.lock();
        if let Some(entry) = state.queue.pop_front() {
            if entry.tx.send(()).is_ok() {
                return;
            }
        }
        state.tokens = state.tokens.saturating_add(1).min(self.config.token_limit);
    }
}

/// 대기열에 등록된 요청
pub struct Waiter {
    id: u64,
    rx: Option<oneshot::Receiver<()>>,
    inner: Arc<LimiterInner>,
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter").field("id", &self.id).finish()
    }
}

impl Waiter {
    /// 토큰이 배정될 때까지 대기
    pub async fn wait(mut self) -> Result<(), CoreError> {
        let result = match self.rx.as_mut() {
            Some(rx) => rx.await,
            None => return Ok(()),
        };
        self.rx = None;
        result.map_err(|_| CoreError::Internal("레이트 리미터가 종료되었습니다".to_string()))
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        match rx.try_recv() {
            // 배정됐지만 사용하지 않은 토큰
            Ok(()) => self.inner.return_token(),
            Err(_) => self.inner.remove_waiter(self.id),
        }
    }
}

/// 토큰 버킷 레이트 리미터
pub struct TokenBucketLimiter {
    inner: Arc<LimiterInner>,
    replenisher: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TokenBucketLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketLimiter")
            .field("config", &self.inner.config)
            .field("available_tokens", &self.available_tokens())
            .field("queued", &self.queued())
            .finish()
    }
}

impl TokenBucketLimiter {
    /// 가득 찬 버킷으로 생성
    ///
    /// 자동 보충 태스크는 첫 입장 시도 시 현재 tokio 런타임에서 시작된다.
    pub fn new(config: RateLimiterConfig) -> Self {
        let tokens = config.token_limit;
        Self {
            inner: Arc::new(LimiterInner {
                config,
                state: Mutex::new(BucketState {
                    tokens,
                    queue: VecDeque::new(),
                    next_id: 0,
                }),
            }),
            replenisher: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.inner.config
    }

    /// 비차단 입장 시도
    pub fn try_acquire(&self) -> Admission {
        self.ensure_replenisher();

        let mut state = self.inner.state.lock();
        if state.tokens > 0 && state.queue.is_empty() {
            state.tokens -= 1;
            trace!("레이트 리미터 토큰 획득 (남은 토큰 {})", state.tokens);
            return Admission::Permit;
        }

        if state.queue.len() as u64 >= u64::from(self.inner.config.queue_limit) {
            warn!(
                "레이트 리미터 대기열 초과 (limit={})",
                self.inner.config.queue_limit
            );
            return Admission::Rejected;
        }

        let (tx, rx) = oneshot::channel();
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);
        state.queue.push_back(QueuedEntry { id, tx });
        debug!("레이트 리미터 대기열 등록 (대기 {}건)", state.queue.len());

        Admission::Queued(Waiter {
            id,
            rx: Some(rx),
            inner: Arc::clone(&self.inner),
        })
    }

    /// 토큰을 얻을 때까지 대기
    pub async fn acquire(&self) -> Result<(), CoreError> {
        match self.try_acquire() {
            Admission::Permit => Ok(()),
            Admission::Queued(waiter) => waiter.wait().await,
            Admission::Rejected => Err(CoreError::RateLimited),
        }
    }

    /// 수동 보충 (`auto_replenish = false`일 때 사용)
    pub fn replenish(&self) {
        self.inner.replenish();
    }

    pub fn available_tokens(&self) -> u32 {
        self.inner.state.lock().tokens
    }

    pub fn queued(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    fn ensure_replenisher(&self) {
        if !self.inner.config.auto_replenish {
            return;
        }
        let mut replenisher = self.replenisher.lock();
        if replenisher.is_some() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let weak: Weak<LimiterInner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.replenish_period();
        *replenisher = Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // 첫 tick은 즉시 완료
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.replenish();
            }
        }));
    }
}

impl Drop for TokenBucketLimiter {
    fn drop(&mut self) {
        if let Some(handle) = self.replenisher.lock().take() {
            handle.abort();
        }
    }
}
