//! 공유 세션 상태.
//!
//! REST 세션, 온라인 추적기, WebSocket 세션이 하나의 [`SessionState`]를
//! `Arc`로 공유한다. 전역 락은 없고 필드별로 원자 연산을 사용한다.
//! `is_connecting`/`is_listening` 전이는 check-and-set으로만 바꾼다.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use tokio::time::Instant;

/// 공유 세션 상태 레코드
#[derive(Debug)]
pub struct SessionState {
    is_online: AtomicBool,
    is_connecting: AtomicBool,
    consecutive_offline_retries: AtomicU32,
    is_listening: AtomicBool,
    authentication_failed: AtomicBool,
    session_id: RwLock<String>,
    last_ping_at: RwLock<Instant>,
    last_refresh_at: RwLock<Instant>,
    ping_counter: AtomicI64,
    refresh_counter: AtomicU32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// 온라인으로 가정한 초기 상태
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            is_online: AtomicBool::new(true),
            is_connecting: AtomicBool::new(false),
            consecutive_offline_retries: AtomicU32::new(0),
            is_listening: AtomicBool::new(false),
            authentication_failed: AtomicBool::new(false),
            session_id: RwLock::new(String::new()),
            last_ping_at: RwLock::new(now),
            last_refresh_at: RwLock::new(now),
            ping_counter: AtomicI64::new(0),
            refresh_counter: AtomicU32::new(0),
        }
    }

    // -- 온라인 --

    pub fn is_online(&self) -> bool {
        self.is_online.load(Ordering::SeqCst)
    }

    /// 온라인 상태 설정, 이전 값 반환
    pub fn set_online(&self, online: bool) -> bool {
        self.is_online.swap(online, Ordering::SeqCst)
    }

    pub fn is_connecting(&self) -> bool {
        self.is_connecting.load(Ordering::SeqCst)
    }

    /// 프로브 시작 시도
    ///
    /// 이미 진행 중이면 None. 반환된 가드가 drop되면 플래그가 해제된다.
    pub fn try_begin_connecting(&self) -> Option<ConnectingGuard<'_>> {
        self.is_connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ConnectingGuard { state: self })
    }

    pub fn offline_retries(&self) -> u32 {
        self.consecutive_offline_retries.load(Ordering::SeqCst)
    }

    /// 재시도 카운터 증가, 증가 후 값 반환
    pub fn increment_offline_retries(&self) -> u32 {
        self.consecutive_offline_retries
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1)
    }

    pub fn reset_offline_retries(&self) {
        self.consecutive_offline_retries.store(0, Ordering::SeqCst);
    }

    // -- 인증 --

    pub fn authentication_failed(&self) -> bool {
        self.authentication_failed.load(Ordering::SeqCst)
    }

    /// 인증 실패 플래그 설정, 이전 값 반환
    pub fn set_authentication_failed(&self, failed: bool) -> bool {
        self.authentication_failed.swap(failed, Ordering::SeqCst)
    }

    // -- 리스닝 --

    pub fn is_listening(&self) -> bool {
        self.is_listening.load(Ordering::SeqCst)
    }

    /// 리스닝 상태 설정, 값이 바뀌었으면 true
    pub fn set_listening(&self, listening: bool) -> bool {
        self.is_listening.swap(listening, Ordering::SeqCst) != listening
    }

    pub fn session_id(&self) -> String {
        self.session_id.read().clone()
    }

    /// 세션 ID 설정, 값이 바뀌었으면 true
    pub fn set_session_id(&self, session_id: &str) -> bool {
        let mut current = self.session_id.write();
        if *current == session_id {
            return false;
        }
        *current = session_id.to_string();
        true
    }

    // -- 핑 --

    pub fn last_ping_at(&self) -> Instant {
        *self.last_ping_at.read()
    }

    pub fn stamp_ping(&self, at: Instant) {
        *self.last_ping_at.write() = at;
    }

    pub fn ping_counter(&self) -> i64 {
        self.ping_counter.load(Ordering::SeqCst)
    }

    /// 핑 카운터 증가, 증가 후 값 반환
    pub fn increment_ping_counter(&self) -> i64 {
        self.ping_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    // -- 리프레시 --

    pub fn last_refresh_at(&self) -> Instant {
        *self.last_refresh_at.read()
    }

    pub fn stamp_refresh(&self, at: Instant) {
        *self.last_refresh_at.write() = at;
    }

    pub fn refresh_counter(&self) -> u32 {
        self.refresh_counter.load(Ordering::SeqCst)
    }

    /// 리프레시 카운터 증가, 증가 후 값 반환
    pub fn increment_refresh_counter(&self) -> u32 {
        self.refresh_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reset_refresh_counter(&self) {
        self.refresh_counter.store(0, Ordering::SeqCst);
    }

    /// 관찰용 스냅샷
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            is_online: self.is_online(),
            is_connecting: self.is_connecting(),
            consecutive_offline_retries: self.offline_retries(),
            is_listening: self.is_listening(),
            authentication_failed: self.authentication_failed(),
            session_id: self.session_id(),
            ping_counter: self.ping_counter(),
            refresh_counter: self.refresh_counter(),
        }
    }
}

/// `is_connecting` 해제 가드
#[derive(Debug)]
pub struct ConnectingGuard<'a> {
    state: &'a SessionState,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.state.is_connecting.store(false, Ordering::SeqCst);
    }
}

/// 세션 상태 스냅샷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub is_online: bool,
    pub is_connecting: bool,
    pub consecutive_offline_retries: u32,
    pub is_listening: bool,
    pub authentication_failed: bool,
    pub session_id: String,
    pub ping_counter: i64,
    pub refresh_counter: u32,
}
