//! 인증 헤더 모델.
//!
//! 이름 → [`AuthenticationHeader`] 매핑을 삽입 순서대로 보관하고,
//! 요청에 적용할 때는 `order` 오름차순(동률이면 삽입 순서)으로 정렬한다.

use serde::{Deserialize, Serialize};

/// 인증 값 주입 위치
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthHeaderTarget {
    /// HTTP 헤더 (`{name}: {token}`)
    #[default]
    Header,
    /// 쿼리 문자열 (`?{name}={token}`)
    UrlSegment,
}

/// 인증 값 적용 대상 채널
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthTypeTarget {
    /// REST 요청에만 적용
    Rest,
    /// WebSocket 연결에만 적용
    WebSocket,
    /// 둘 다 적용
    #[default]
    Both,
}

impl AuthTypeTarget {
    /// REST 요청에 적용되는지 여부
    pub fn applies_to_rest(self) -> bool {
        matches!(self, AuthTypeTarget::Rest | AuthTypeTarget::Both)
    }

    /// WebSocket 연결에 적용되는지 여부
    pub fn applies_to_websocket(self) -> bool {
        matches!(self, AuthTypeTarget::WebSocket | AuthTypeTarget::Both)
    }
}

/// 인증 헤더 (요청에 부착된 후 불변)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationHeader {
    /// 토큰 값 (예: "Bearer abc", "api-key")
    pub token: String,
    /// 같은 대상에 여러 헤더가 있을 때의 적용 순서
    #[serde(default)]
    pub order: i32,
    /// 선택적 포맷 힌트
    #[serde(default)]
    pub format: Option<String>,
    /// 주입 위치
    #[serde(default)]
    pub target: AuthHeaderTarget,
    /// 적용 채널
    #[serde(default, rename = "type")]
    pub kind: AuthTypeTarget,
}

impl AuthenticationHeader {
    /// 기본 대상(Header, Both)으로 헤더 생성
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            order: 0,
            format: None,
            target: AuthHeaderTarget::Header,
            kind: AuthTypeTarget::Both,
        }
    }

    /// 주입 위치 지정
    pub fn with_target(mut self, target: AuthHeaderTarget) -> Self {
        self.target = target;
        self
    }

    /// 적용 채널 지정
    pub fn with_kind(mut self, kind: AuthTypeTarget) -> Self {
        self.kind = kind;
        self
    }

    /// 적용 순서 지정
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

/// 이름 → 인증 헤더 매핑
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthHeaderSet {
    entries: Vec<(String, AuthenticationHeader)>,
}

impl AuthHeaderSet {
    /// 빈 매핑 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 헤더 추가 또는 교체
    ///
    /// 같은 키가 이미 있으면 그 자리에서 교체한다 (키당 항목 1개).
    pub fn insert(&mut self, name: impl Into<String>, header: AuthenticationHeader) {
        let name = name.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = header,
            None => self.entries.push((name, header)),
        }
    }

    /// 토큰/대상/순서/채널로 헤더 추가 또는 교체
    pub fn add_or_update(
        &mut self,
        name: impl Into<String>,
        token: impl Into<String>,
        target: AuthHeaderTarget,
        order: i32,
        kind: AuthTypeTarget,
    ) {
        self.insert(
            name,
            AuthenticationHeader::new(token)
                .with_target(target)
                .with_order(order)
                .with_kind(kind),
        );
    }

    /// 키로 헤더 조회
    pub fn get(&self, name: &str) -> Option<&AuthenticationHeader> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, header)| header)
    }

    /// 키로 헤더 제거
    pub fn remove(&mut self, name: &str) -> Option<AuthenticationHeader> {
        let idx = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `order` 오름차순(동률이면 삽입 순서) 정렬된 항목
    pub fn ordered(&self) -> Vec<(&str, &AuthenticationHeader)> {
        let mut items: Vec<_> = self
            .entries
            .iter()
            .map(|(key, header)| (key.as_str(), header))
            .collect();
        // sort_by_key는 안정 정렬
        items.sort_by_key(|(_, header)| header.order);
        items
    }

    /// REST 요청에 적용할 항목 (정렬됨)
    pub fn for_rest(&self) -> Vec<(&str, &AuthenticationHeader)> {
        self.ordered()
            .into_iter()
            .filter(|(_, header)| header.kind.applies_to_rest())
            .collect()
    }

    /// WebSocket에 적용할 항목 (정렬됨)
    pub fn for_websocket(&self) -> Vec<(&str, &AuthenticationHeader)> {
        self.ordered()
            .into_iter()
            .filter(|(_, header)| header.kind.applies_to_websocket())
            .collect()
    }

    /// WebSocket에 적용할 첫 번째 항목
    pub fn first_for_websocket(&self) -> Option<(&str, &AuthenticationHeader)> {
        self.for_websocket().into_iter().next()
    }
}

impl FromIterator<(String, AuthenticationHeader)> for AuthHeaderSet {
    fn from_iter<I: IntoIterator<Item = (String, AuthenticationHeader)>>(iter: I) -> Self {
        let mut set = AuthHeaderSet::new();
        for (name, header) in iter {
            set.insert(name, header);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_or_update_is_idempotent_per_key() {
        let mut set = AuthHeaderSet::new();
        set.add_or_update(
            "X-Api-Key",
            "first",
            AuthHeaderTarget::Header,
            0,
            AuthTypeTarget::Both,
        );
        set.add_or_update(
            "X-Api-Key",
            "second",
            AuthHeaderTarget::Header,
            0,
            AuthTypeTarget::Both,
        );

        assert_eq!(set.len(), 1);
        assert_eq!(set.get("X-Api-Key").unwrap().token, "second");
    }

    #[test]
    fn ordered_by_order_then_insertion() {
        let mut set = AuthHeaderSet::new();
        set.insert("c", AuthenticationHeader::new("3").with_order(2));
        set.insert("a", AuthenticationHeader::new("1").with_order(0));
        set.insert("b", AuthenticationHeader::new("2").with_order(0));

        let names: Vec<&str> = set.ordered().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn channel_filters() {
        let mut set = AuthHeaderSet::new();
        set.insert(
            "rest",
            AuthenticationHeader::new("r").with_kind(AuthTypeTarget::Rest),
        );
        set.insert(
            "ws",
            AuthenticationHeader::new("w").with_kind(AuthTypeTarget::WebSocket),
        );
        set.insert("both", AuthenticationHeader::new("b"));

        let rest: Vec<&str> = set.for_rest().into_iter().map(|(n, _)| n).collect();
        assert_eq!(rest, vec!["rest", "both"]);

        let (first_ws, _) = set.first_for_websocket().unwrap();
        assert_eq!(first_ws, "ws");
    }

    #[test]
    fn remove_entry() {
        let mut set = AuthHeaderSet::new();
        set.insert("token", AuthenticationHeader::new("abc"));
        assert!(set.remove("token").is_some());
        assert!(set.is_empty());
        assert!(set.remove("token").is_none());
    }

    #[test]
    fn serde_uses_type_field_name() {
        let header = AuthenticationHeader::new("abc").with_kind(AuthTypeTarget::WebSocket);
        let json = serde_json::to_string(&header).unwrap();
        assert!(json.contains(r#""type":"WebSocket""#));
    }
}
