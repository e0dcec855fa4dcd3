//! XFP 서버 (송신자) - XOR-FEC Flow Protocol
//!
//! 요청받은 이름의 페이로드를 Go-Back-N + XOR FEC로 전송
//! - 요청마다 별도 세션 소켓
//! - 손실 시뮬레이션 지원 (--drop-rate)
//!
//! 사용법:
//!   cargo run --release --bin xfp-server -- [OPTIONS]
//!
//! 예시:
//!   # 디렉토리의 파일 제공
//!   cargo run --release --bin xfp-server -- --bind 0.0.0.0:9000 --dir ./images
//!
//!   # 파일 하나 + 10% 손실 시뮬레이션
//!   cargo run --release --bin xfp-server -- -f photo.raw --drop-rate 0.1

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use xfp::{Catalog, Config, DirectoryCatalog, MemoryCatalog, Payload, Server};

/// 서버 설정
struct ServerConfig {
    bind_addr: SocketAddr,
    dir: Option<PathBuf>,
    files: Vec<PathBuf>,
    config: Config,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            dir: None,
            files: Vec::new(),
            config: Config::default(),
        }
    }
}

fn parse_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--dir" | "-d" => {
                if i + 1 < args.len() {
                    config.dir = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--file" | "-f" => {
                if i + 1 < args.len() {
                    config.files.push(PathBuf::from(&args[i + 1]));
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
                    r#"XFP Server - XOR-FEC Flow Protocol 서버

슬라이딩 윈도우 + 누적 ACK + Go-Back-N, 그룹당 XOR 패리티 1개

사용법:
  cargo run --release --bin xfp-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>       바인드 주소 (기본: 0.0.0.0:9000)
  -d, --dir <PATH>        이 디렉토리의 파일을 이름으로 제공
  -f, --file <PATH>       파일 하나를 파일 이름으로 제공 (여러 번 지정 가능)
  --preset <NAME>         low | high | unstable
  --segment-size <SIZE>   기본 세그먼트 크기 (기본: 1200)
  --window <N>            기본 윈도우 (세그먼트, 기본: 32)
  --fec-group <N>         기본 FEC 그룹 크기 (기본: 8)
  --rto <MS>              재전송 타임아웃 (기본: 200)
  --retries <N>           최대 재시도 (기본: 10)
  --drop-rate <RATE>      송신 손실 시뮬레이션 0.0~1.0 (기본: 0)
  --seed <N>              손실 시뮬레이션 시드
  -h, --help              이 도움말 출력

--dir과 --file이 모두 없으면 1MB 테스트 데이터를 "test"로 제공
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

async fn serve<C: Catalog + 'static>(
    bind_addr: SocketAddr,
    config: Config,
    catalog: C,
) -> xfp::Result<()> {
    let server = Server::bind(bind_addr, config, catalog).await?;
    server.run().await
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

    let server_config = parse_args();
    server_config.config.validate()?;

    info!("XFP Server starting...");
    info!("Bind address: {}", server_config.bind_addr);
    info!(
        "Segment size: {} bytes, window: {}, FEC group: {} (overhead {:.1}%)",
        server_config.config.segment_size,
        server_config.config.window_size,
        server_config.config.fec_group_size,
        server_config.config.fec_overhead() * 100.0
    );
    if server_config.config.drop_rate > 0.0 {
        info!(
            "Simulated loss: {:.1}%",
            server_config.config.drop_rate * 100.0
        );
    }

    if let Some(dir) = server_config.dir {
        info!("Serving directory: {:?}", dir);
        return Ok(serve(
            server_config.bind_addr,
            server_config.config,
            DirectoryCatalog::new(dir),
        )
        .await?);
    }

    let mut catalog = MemoryCatalog::new();
    for path in &server_config.files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or("파일 이름 필요")?;
        let data = std::fs::read(path)?;
        info!("Loaded {:?}: {} bytes", name, data.len());
        catalog.insert(name, Payload::raw(data));
    }
    if catalog.is_empty() {
        // 테스트용 더미 데이터 (1MB)
        info!("Using test data (1MB) as \"test\"");
        catalog.insert("test", Payload::raw(vec![0xABu8; 1024 * 1024]));
    }

    Ok(serve(server_config.bind_addr, server_config.config, catalog).await?)
}
