//! 송신 서버
//!
//! 잘 알려진 포트 하나에서 CONNECT-REQUEST를 받고, 요청마다 새 임시 소켓과
//! 세션 태스크를 만듦. 이후 통신은 전부 세션 소켓으로 이뤄지므로
//! CONNECT-REPLY의 출발 주소가 수신자 쪽 세션 상대가 됨

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::channel::Link;
use crate::message::{ConnectRequest, ReplyStatus};
use crate::segment::{Segment, SegmentKind};
use crate::sender::Sender;
use crate::{Config, Result};

/// 진행 중인 세션 (수신자 주소 → 시작 시간)
pub type SessionRegistry = Arc<DashMap<SocketAddr, Instant>>;

/// 송신 서버
pub struct Server<C> {
    config: Config,
    link: Link,
    catalog: Arc<C>,
    sessions: SessionRegistry,

    /// 세션 소켓을 바인딩할 주소 (기본: 리스너 IP, 임시 포트)
    session_addr: SocketAddr,

    /// 지금까지 수락한 요청 수 (세션별 손실 시드 분리용)
    accepted: u64,
}

impl<C: Catalog + 'static> Server<C> {
    /// 주소에 바인딩
    pub async fn bind(addr: SocketAddr, config: Config, catalog: C) -> Result<Self> {
        config.validate()?;
        let link = Link::bind(addr, &config).await?;
        let local = link.local_addr()?;
        info!("XFP Server listening on {}", local);

        Ok(Self {
            config,
            link,
            catalog: Arc::new(catalog),
            sessions: Arc::new(DashMap::new()),
            session_addr: SocketAddr::new(local.ip(), 0),
            accepted: 0,
        })
    }

    /// 세션 소켓 바인딩 주소 지정 (리스너가 와일드카드 주소일 때 등)
    pub fn with_session_addr(mut self, addr: SocketAddr) -> Self {
        self.session_addr = addr;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.link.local_addr()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// 세션 레지스트리 핸들 (`run`으로 서버를 넘긴 뒤 상태 확인용)
    pub fn sessions(&self) -> SessionRegistry {
        self.sessions.clone()
    }

    /// 요청 수락 루프
    ///
    /// 요청 하나를 처리하다 실패해도 그 요청만 버리고 계속 받음.
    /// 리스너 소켓 자체의 에러만 반환
    pub async fn run(mut self) -> Result<()> {
        loop {
            let (segment, from) = self.link.recv().await?;
            if let Err(e) = self.accept(&segment, from).await {
                warn!("요청 처리 실패, 무시 ({}): {}", from, e);
            }
        }
    }

    async fn accept(&mut self, segment: &Segment, from: SocketAddr) -> Result<()> {
        if segment.kind != SegmentKind::ConnectRequest {
            debug!("리스너로 온 {:?} 무시 ({})", segment.kind, from);
            return Ok(());
        }

        // 응답이 유실된 경우는 세션 쪽 재전송이 처리함
        if self.sessions.contains_key(&from) {
            debug!("진행 중인 세션의 중복 요청 ({})", from);
            return Ok(());
        }

        let request = match ConnectRequest::from_segment(segment) {
            Ok(request) => request,
            Err(e) => {
                debug!("잘못된 CONNECT-REQUEST ({}): {}", from, e);
                return Ok(());
            }
        };

        let mut config = self.config.clone();
        config.loss_seed = config.loss_seed.map(|seed| seed.wrapping_add(self.accepted));
        self.accepted += 1;

        let link = match Link::bind(self.session_addr, &config).await {
            Ok(link) => link,
            Err(e) => {
                warn!("세션 소켓 생성 실패, 요청 버림 ({}): {}", from, e);
                return Ok(());
            }
        };
        let session_socket = link.local_addr()?;
        info!(
            "요청 수락: {} -> {:?} (session socket {})",
            from, request.name, session_socket
        );

        self.sessions.insert(from, Instant::now());
        let catalog = self.catalog.clone();
        let sessions = self.sessions.clone();

        tokio::spawn(async move {
            let mut sender = Sender::new(config, link, from);
            let result = match catalog.lookup(&request.name) {
                Ok(payload) => sender.serve(&request, payload).await.map(|_| ()),
                Err(e) => {
                    warn!("페이로드 조회 실패 ({:?}): {}", request.name, e);
                    sender.refuse(ReplyStatus::Rejected).await
                }
            };
            if let Err(e) = result {
                warn!("세션 에러 ({}): {}", from, e);
            }

            if let Some((_, started)) = sessions.remove(&from) {
                debug!("세션 종료 ({}), 경과 {:?}", from, started.elapsed());
            }
        });

        Ok(())
    }
}
