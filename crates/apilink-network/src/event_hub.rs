//! 세션 이벤트 허브.
//!
//! `tokio::broadcast` 기반 이벤트 라우팅 + 에러 채널.
//! 기본 모드에서 에러는 이벤트로만 전달되고, rethrow 모드에서는
//! 같은 에러를 호출자에게도 반환한다.

use apilink_core::error::CoreError;
use apilink_core::models::event::SessionEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// 기본 채널 용량
const DEFAULT_CAPACITY: usize = 256;

/// 세션 이벤트 허브 (복제 시 같은 채널 공유)
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<SessionEvent>,
    rethrow: Arc<AtomicBool>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            rethrow: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 이벤트 발행 (구독자가 없으면 버림)
    pub fn publish(&self, event: SessionEvent) {
        debug!("세션 이벤트 발행: {:?}", std::mem::discriminant(&event));
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn set_rethrow(&self, rethrow: bool) {
        self.rethrow.store(rethrow, Ordering::SeqCst);
    }

    pub fn rethrow_on_error(&self) -> bool {
        self.rethrow.load(Ordering::SeqCst)
    }

    /// 에러 이벤트 발행 후, rethrow 모드면 `Err` 반환
    pub fn report(&self, event: SessionEvent, error: CoreError) -> Result<(), CoreError> {
        warn!("{error}");
        self.publish(event);
        if self.rethrow_on_error() {
            Err(error)
        } else {
            Ok(())
        }
    }

    /// 에러 종류에 맞는 채널로 보고
    pub fn report_error(&self, error: CoreError) -> Result<(), CoreError> {
        self.report(SessionEvent::from_error(error.clone()), error)
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
