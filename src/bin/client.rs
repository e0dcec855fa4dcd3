//! XFP 클라이언트 (수신자) - XOR-FEC Flow Protocol
//!
//! 이름으로 페이로드를 요청해서 받음
//! - 그룹당 손실 1개는 FEC로 즉시 복원
//! - 누적 ACK만 보내므로 업링크 부담이 작음
//!
//! 사용법:
//!   cargo run --release --bin xfp-client -- [OPTIONS]
//!
//! 예시:
//!   # 기본 수신
//!   cargo run --release --bin xfp-client -- --server 127.0.0.1:9000 --name photo.raw -o out.raw
//!
//!   # 작은 윈도우 + ACK 손실 시뮬레이션
//!   cargo run --release --bin xfp-client -- -s 127.0.0.1:9000 -n test --window 8 --fec-group 4 --drop-rate 0.05

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use xfp::{Config, Receiver};

/// 클라이언트 설정
struct ClientConfig {
    bind_addr: SocketAddr,
    server_addr: SocketAddr,
    name: String,
    output_path: Option<PathBuf>,
    config: Config,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            server_addr: SocketAddr::from(([127, 0, 0, 1], 9000)),
            name: "test".into(),
            output_path: None,
            config: Config::default(),
        }
    }
}

fn parse_args() -> ClientConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ClientConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" | "-s" => {
                if i + 1 < args.len() {
                    config.server_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--name" | "-n" => {
                if i + 1 < args.len() {
                    config.name = args[i + 1].clone();
                    i += 1;
                }
            }
            "--output" | "-o" => {
                if i + 1 < args.len() {
                    config.output_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--preset" => {
                if i + 1 < args.len() {
                    config.config = match args[i + 1].as_str() {
                        "low" => Config::low_spec(),
                        "high" => Config::high_performance(),
                        "unstable" => Config::unstable_network(),
                        _ => Config::default(),
                    };
                    i += 1;
                }
            }
            "--segment-size" => {
                if i + 1 < args.len() {
                    config.config.segment_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--window" => {
                if i + 1 < args.len() {
                    config.config.window_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--fec-group" => {
                if i + 1 < args.len() {
                    config.config.fec_group_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--rto" => {
                if i + 1 < args.len() {
                    config.config.rto_ms = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--retries" => {
                if i + 1 < args.len() {
                    config.config.max_retries = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--drop-rate" => {
                if i + 1 < args.len() {
                    config.config.drop_rate = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--seed" => {
                if i + 1 < args.len() {
                    config.config.loss_seed = Some(args[i + 1].parse().expect("유효한 숫자 필요"));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"XFP Client - XOR-FEC Flow Protocol 클라이언트

이름으로 페이로드를 요청하고 누적 ACK로 수신

사용법:
  cargo run --release --bin xfp-client -- [OPTIONS]

옵션:
  -s, --server <ADDR>     서버 주소 (기본: 127.0.0.1:9000)
  -b, --bind <ADDR>       바인드 주소 (기본: 0.0.0.0:0)
  -n, --name <NAME>       요청할 이름 (기본: test)
  -o, --output <PATH>     수신 데이터 저장 경로
  --preset <NAME>         low | high | unstable
  --segment-size <SIZE>   희망 세그먼트 크기 (기본: 1200)
  --window <N>            수신 윈도우 (세그먼트, 기본: 32)
  --fec-group <N>         FEC 그룹 크기 (기본: 8)
  --rto <MS>              재시도 간격 (기본: 200)
  --retries <N>           최대 재시도 (기본: 10)
  --drop-rate <RATE>      ACK 손실 시뮬레이션 0.0~1.0 (기본: 0)
  --seed <N>              손실 시뮬레이션 시드
  -h, --help              이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정 (RUST_LOG로 조정)
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let client_config = parse_args();

    info!("XFP Client starting...");
    info!("Server address: {}", client_config.server_addr);
    info!("Requesting: {:?}", client_config.name);

    let mut receiver = Receiver::bind(client_config.bind_addr, client_config.config).await?;
    info!("Bound to local address: {}", receiver.local_addr()?);

    // 진행률 표시
    let mut progress = receiver.progress();
    let progress_task = tokio::spawn(async move {
        let mut last = 0u32;
        while progress.changed().await.is_ok() {
            let received = *progress.borrow();
            if received >= last.saturating_add(1024 * 1024) {
                info!("Received {} bytes", received);
                last = received;
            }
        }
    });

    let outcome = receiver
        .fetch(client_config.server_addr, &client_config.name)
        .await?;
    progress_task.abort();

    let Some(outcome) = outcome else {
        warn!("서버 응답 없음");
        return Ok(());
    };

    info!(
        "Payload: {}x{} {:?}",
        outcome.meta.width, outcome.meta.height, outcome.meta.pixel_format
    );
    info!("{}", outcome.stats.summary());

    let data = outcome.into_data()?;
    if let Some(path) = &client_config.output_path {
        std::fs::write(path, &data)?;
        info!("Saved {} bytes to {:?}", data.len(), path);
    }

    Ok(())
}
