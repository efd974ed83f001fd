//! REST 세션.
//!
//! 요청 1건을 끝까지 처리한다: 경로/쿼리/인증 헤더 조립, 본문 인코딩,
//! 레이트 리미터 입장, 데드라인과 취소 토큰을 건 전송, 응답 분류, 이벤트 보고.
//!
//! 전송 클라이언트는 설정/리미터가 바뀔 때 재생성되며, 호출마다 사용 직전에
//! 현재 인스턴스를 다시 읽는다.

use apilink_core::error::{CoreError, TransportError};
use apilink_core::models::auth::AuthHeaderTarget;
use apilink_core::models::event::SessionEvent;
use apilink_core::models::outcome::{OutcomeKind, RequestOutcome};
use apilink_core::models::request::{HttpRequest, RestRequest};
use apilink_core::models::session::SessionState;
use apilink_core::ports::transport::{ClientSettings, HttpTransport, HttpTransportFactory};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::classifier::classify;
use crate::event_hub::EventHub;
use crate::rate_limiter::TokenBucketLimiter;
use crate::strip_query;

/// 작업 이름 (TaskCanceled 이벤트의 origin)
const EXECUTE_ORIGIN: &str = "execute";

/// REST 요청 실행기
pub struct RestSession {
    factory: Arc<dyn HttpTransportFactory>,
    transport: RwLock<Arc<dyn HttpTransport>>,
    settings: RwLock<ClientSettings>,
    limiter: RwLock<Option<Arc<TokenBucketLimiter>>>,
    /// 재생성 진행 중 플래그 (동시 트리거 병합)
    updating_clients: AtomicBool,
    /// 설정 변경 세대 (재생성 중 변경 감지)
    generation: AtomicU64,
    cancel: Mutex<CancellationToken>,
    state: Arc<SessionState>,
    events: EventHub,
}

impl std::fmt::Debug for RestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestSession")
            .field("settings", &*self.settings.read())
            .field("limiter", &self.limiter.read().is_some())
            .finish()
    }
}

/// 플래그 해제 가드
struct FlagReset<'a>(&'a AtomicBool);

impl Drop for FlagReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RestSession {
    pub fn new(
        factory: Arc<dyn HttpTransportFactory>,
        settings: ClientSettings,
        limiter: Option<Arc<TokenBucketLimiter>>,
        state: Arc<SessionState>,
        events: EventHub,
    ) -> Result<Self, CoreError> {
        let transport = factory.create(&settings)?;
        Ok(Self {
            factory,
            transport: RwLock::new(transport),
            settings: RwLock::new(settings),
            limiter: RwLock::new(limiter),
            updating_clients: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            cancel: Mutex::new(CancellationToken::new()),
            state,
            events,
        })
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn settings(&self) -> ClientSettings {
        self.settings.read().clone()
    }

    pub fn default_timeout(&self) -> Duration {
        self.settings.read().default_timeout
    }

    /// 현재 전송 클라이언트
    pub fn current_transport(&self) -> Arc<dyn HttpTransport> {
        Arc::clone(&self.transport.read())
    }

    pub fn limiter(&self) -> Option<Arc<TokenBucketLimiter>> {
        self.limiter.read().clone()
    }

    /// 설정 교체 후 전송 클라이언트 재생성
    ///
    /// 다른 재생성이 진행 중이면 그쪽에 병합되고 `Ok(false)`를 반환한다.
    pub fn reconfigure(&self, settings: ClientSettings) -> Result<bool, CoreError> {
        *self.settings.write() = settings;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.rebuild_client()
    }

    /// 레이트 리미터 교체 (None이면 우회) 후 전송 클라이언트 재생성
    pub fn set_limiter(&self, limiter: Option<Arc<TokenBucketLimiter>>) -> Result<bool, CoreError> {
        *self.limiter.write() = limiter;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.rebuild_client()
    }

    fn rebuild_client(&self) -> Result<bool, CoreError> {
        if self
            .updating_clients
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("전송 클라이언트 재생성 진행 중, 요청 병합");
            return Ok(false);
        }
        let _reset = FlagReset(&self.updating_clients);

        loop {
            let generation = self.generation.load(Ordering::SeqCst);
            let settings = self.settings.read().clone();
            let transport = self.factory.create(&settings)?;
            *self.transport.write() = transport;
            if self.generation.load(Ordering::SeqCst) == generation {
                info!("전송 클라이언트 재생성: {}", settings.base_uri);
                return Ok(true);
            }
        }
    }

    /// 진행 중인 모든 요청 취소
    pub fn cancel_current_requests(&self) {
        let previous = std::mem::replace(&mut *self.cancel.lock(), CancellationToken::new());
        previous.cancel();
        debug!("진행 중인 REST 요청 취소");
    }

    /// 전송 포트로 넘길 요청 조립
    ///
    /// 쿼리는 `url_segments` 다음에 UrlSegment 인증 값,
    /// 인증 값은 `order` 오름차순으로 적용된다.
    pub fn compose(&self, request: &RestRequest) -> Result<HttpRequest, CoreError> {
        let mut query = request.url_segments.clone();
        let mut headers = Vec::new();
        for (name, header) in request.auth_headers.for_rest() {
            let pair = (name.to_string(), header.token.clone());
            match header.target {
                AuthHeaderTarget::UrlSegment => query.push(pair),
                AuthHeaderTarget::Header => headers.push(pair),
            }
        }

        let body = match &request.body {
            Some(body) => body.encode(request.body_format)?,
            None => None,
        };

        Ok(HttpRequest {
            method: request.method,
            path: request.path(),
            query,
            headers,
            body,
            timeout: request.timeout.unwrap_or_else(|| self.default_timeout()),
        })
    }

    /// 요청 실행
    ///
    /// 기본 모드에서는 모든 에러가 이벤트로 보고되고 `Ok(outcome)`이 반환된다.
    /// rethrow 모드에서는 보고된 에러가 `Err`로도 반환된다.
    pub async fn execute(&self, request: RestRequest) -> Result<RequestOutcome, CoreError> {
        match self.execute_reported(request).await {
            (_, Some(raised)) => Err(raised),
            (outcome, None) => Ok(outcome),
        }
    }

    /// 요청 실행 후 결과와 rethrow 모드에서 올라온 에러를 함께 반환
    ///
    /// rethrow 모드에서도 결과를 잃지 않아야 하는 호출자(온라인 추적)용.
    pub(crate) async fn execute_reported(
        &self,
        request: RestRequest,
    ) -> (RequestOutcome, Option<CoreError>) {
        let http_request = match self.compose(&request) {
            Ok(http_request) => http_request,
            Err(e) => {
                let raised = self.events.report_error(e.clone()).err();
                let mut outcome = RequestOutcome::no_response("Invalid", e);
                outcome.is_online = self.state.is_online();
                return (outcome, raised);
            }
        };

        let uri = self.current_transport().build_uri(&http_request);
        debug!("REST 요청: {} {}", http_request.method, strip_query(&uri));

        let token = self.cancel.lock().clone();

        if let Some(limiter) = self.limiter() {
            let admitted = tokio::select! {
                result = limiter.acquire() => result,
                _ = token.cancelled() => {
                    Err(TransportError::Cancelled.into_core(EXECUTE_ORIGIN, &uri))
                }
            };
            if let Err(e) = admitted {
                return self.fail_before_send(e, &uri);
            }
        }

        // 리미터 대기 중 재생성됐을 수 있으므로 사용 직전에 다시 조회
        let transport = self.current_transport();
        let deadline = http_request.timeout;
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(TransportError::Cancelled),
            result = tokio::time::timeout(deadline, transport.execute(http_request)) => {
                result.unwrap_or(Err(TransportError::Timeout))
            }
        };

        match result {
            Ok(raw) => self.handle_response(classify(&raw, &uri), &uri),
            Err(err) => self.handle_transport_error(err, &uri),
        }
    }

    /// 성공 본문을 `T`로 디코딩해 반환
    ///
    /// 요청이 실패했거나 디코딩에 실패하면 `Ok(None)`.
    /// 디코딩 실패는 변환 에러 채널로 보고된다.
    pub async fn execute_as<T: DeserializeOwned>(
        &self,
        request: RestRequest,
    ) -> Result<Option<T>, CoreError> {
        let outcome = self.execute(request).await?;
        if !outcome.succeeded {
            return Ok(None);
        }
        match outcome.decode::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                self.events.report_error(e)?;
                Ok(None)
            }
        }
    }

    fn fail_before_send(
        &self,
        error: CoreError,
        uri: &str,
    ) -> (RequestOutcome, Option<CoreError>) {
        let status = if matches!(error, CoreError::RateLimited) {
            "RateLimited"
        } else {
            "Canceled"
        };
        let raised = self.events.report_error(error.clone()).err();
        let mut outcome = RequestOutcome::no_response(status, error);
        // 전송 전 실패는 엔드포인트 상태와 무관
        outcome.is_online = self.state.is_online();
        debug!("REST 요청 전송 전 실패: {}", strip_query(uri));
        (outcome, raised)
    }

    fn handle_transport_error(
        &self,
        err: TransportError,
        uri: &str,
    ) -> (RequestOutcome, Option<CoreError>) {
        let status = match err {
            TransportError::Timeout => "Timeout",
            TransportError::Cancelled => "Canceled",
            TransportError::Connect(_) => "ConnectFailure",
            TransportError::Request(_) => "RequestFailure",
        };
        let is_cancellation = matches!(err, TransportError::Timeout | TransportError::Cancelled);
        let error = err.into_core(EXECUTE_ORIGIN, uri);

        let mut raised = None;
        if is_cancellation {
            self.events.publish(SessionEvent::from_error(error.clone()));
            // 온라인으로 보이는 동안의 느린 응답 1건은 에러로 올리지 않음
            if !self.state.is_online() {
                raised = self
                    .events
                    .report(SessionEvent::Error(error.clone()), error.clone())
                    .err();
            } else {
                debug!("REST 요청 타임아웃 (온라인 상태, 보고 생략): {}", strip_query(uri));
            }
        } else {
            raised = self.events.report_error(error.clone()).err();
        }

        (RequestOutcome::no_response(status, error), raised)
    }

    fn handle_response(
        &self,
        outcome: RequestOutcome,
        uri: &str,
    ) -> (RequestOutcome, Option<CoreError>) {
        let mut raised = None;
        match outcome.kind {
            OutcomeKind::Success => {
                if self.state.set_authentication_failed(false) {
                    info!("인증 복구됨");
                    self.events.publish(SessionEvent::AuthenticationSucceeded);
                }
            }
            OutcomeKind::AuthFailure => {
                self.state.set_authentication_failed(true);
                let error = outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| CoreError::Auth(strip_query(uri).to_string()));
                raised = self
                    .events
                    .report(
                        SessionEvent::AuthenticationError {
                            uri: strip_query(uri).to_string(),
                            status: outcome.status.clone(),
                        },
                        error,
                    )
                    .err();
            }
            OutcomeKind::Error => {
                if let Some(error) = outcome.error.clone() {
                    raised = self
                        .events
                        .report(
                            SessionEvent::RestError {
                                error: error.clone(),
                                is_online: outcome.is_online,
                            },
                            error,
                        )
                        .err();
                }
            }
            OutcomeKind::Conflict | OutcomeKind::NoResponse => {}
        }
        (outcome, raised)
    }
}
