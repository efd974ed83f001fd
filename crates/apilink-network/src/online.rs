//! 온라인 상태 추적.
//!
//! 빈 요청으로 엔드포인트 생존을 확인하고, 히스테리시스를 적용해
//! 일시적인 실패 1건으로 온라인 세션이 오프라인으로 뒤집히지 않게 한다.
//!
//! 응답이 없으면 짧은 고정 타임아웃으로 최대 `retries_when_offline`번 더
//! 확인한 뒤에만 오프라인을 확정한다. 이미 오프라인이었거나 응답이 오면
//! 즉시 확정한다. 재시도 중간 상태는 외부에 노출되지 않는다.

use apilink_core::error::CoreError;
use apilink_core::models::auth::AuthHeaderSet;
use apilink_core::models::event::SessionEvent;
use apilink_core::models::request::RestRequest;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::rest_session::RestSession;

/// 히스테리시스 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnlinePolicy {
    /// 오프라인 확정 전 추가 확인 횟수
    pub retries_when_offline: u32,
    /// 추가 확인의 고정 타임아웃
    pub offline_retry_timeout: Duration,
}

impl Default for OnlinePolicy {
    fn default() -> Self {
        Self {
            retries_when_offline: 2,
            offline_retry_timeout: Duration::from_secs(2),
        }
    }
}

/// 주기적 확인 대상
#[derive(Debug, Clone, Default)]
pub struct ProbeTarget {
    pub command_base: String,
    pub command: String,
    /// 매 주기마다 읽는 공유 인증 헤더 (주기 사이의 변경 반영)
    pub auth_headers: Arc<RwLock<AuthHeaderSet>>,
    /// None이면 세션 기본 타임아웃
    pub timeout: Option<Duration>,
}

/// 온라인 상태 추적기
#[derive(Debug)]
pub struct OnlineStateTracker {
    rest: Arc<RestSession>,
    policy: RwLock<OnlinePolicy>,
}

impl OnlineStateTracker {
    pub fn new(rest: Arc<RestSession>, policy: OnlinePolicy) -> Self {
        Self {
            rest,
            policy: RwLock::new(policy),
        }
    }

    pub fn policy(&self) -> OnlinePolicy {
        *self.policy.read()
    }

    pub fn set_policy(&self, policy: OnlinePolicy) {
        *self.policy.write() = policy;
    }

    /// 생존 확인 후 확정된 온라인 상태 반환
    ///
    /// 이미 확인이 진행 중이면 아무것도 하지 않고 현재 상태를 반환한다.
    /// rethrow 모드에서 올라온 에러는 온라인 상태를 확정한 뒤에 반환된다.
    pub async fn probe(
        &self,
        command_base: &str,
        auth_headers: &AuthHeaderSet,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<bool, CoreError> {
        let state = Arc::clone(self.rest.state());
        let Some(_connecting) = state.try_begin_connecting() else {
            debug!("온라인 확인 진행 중, 요청 무시");
            return Ok(state.is_online());
        };

        let policy = self.policy();
        let mut timeout = timeout.unwrap_or_else(|| self.rest.default_timeout());

        loop {
            let request = RestRequest::get(command_base)
                .with_command(command)
                .with_auth(auth_headers.clone())
                .with_timeout(timeout);
            // rethrow 모드의 에러는 확정 시점의 마지막 시도 것만 반환
            let (outcome, raised) = self.rest.execute_reported(request).await;
            let reachable = outcome.is_online;

            let was_offline = !state.is_online();
            let retries = state.offline_retries();
            if was_offline || reachable || retries > policy.retries_when_offline {
                state.reset_offline_retries();
                let previous = state.set_online(reachable);
                if previous != reachable {
                    if reachable {
                        info!("엔드포인트 온라인 전환");
                    } else {
                        warn!("엔드포인트 오프라인 전환 (재확인 {retries}회 실패)");
                    }
                    self.rest
                        .events()
                        .publish(SessionEvent::OnlineChanged { is_online: reachable });
                }
                return match raised {
                    Some(error) => Err(error),
                    None => Ok(reachable),
                };
            }

            let attempt = state.increment_offline_retries();
            debug!(
                "응답 없음, 재확인 {}/{}",
                attempt,
                policy.retries_when_offline.saturating_add(1)
            );
            timeout = policy.offline_retry_timeout;
        }
    }

    /// 주기적 생존 확인 태스크 시작
    ///
    /// `cancel`이 취소되면 종료한다.
    pub fn spawn_periodic(
        self: Arc<Self>,
        interval: Duration,
        target: ProbeTarget,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let auth_headers = target.auth_headers.read().clone();
                        if let Err(e) = self
                            .probe(
                                &target.command_base,
                                &auth_headers,
                                &target.command,
                                target.timeout,
                            )
                            .await
                        {
                            warn!("주기적 온라인 확인 실패: {e}");
                        }
                    }
                }
            }
            debug!("주기적 온라인 확인 종료");
        })
    }
}
