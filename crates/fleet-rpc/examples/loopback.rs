//! 进程内回环示例：生成代理、在本地调度器上注册处理器，并发出一次链式调用。
//!
//! 运行：`RUST_LOG=fleet_rpc=debug cargo run -p fleet-rpc --example loopback`

use std::sync::Arc;

use fleet_rpc::server::{Handled, HandlerRegistry, LocalChannel, MethodTable, RpcDispatcher, arg};
use fleet_rpc::{RemoteContract, RpcConfig, RpcFactory, RpcResult, contract, telemetry};

#[contract(name = "demo::Proxy")]
pub trait Proxy {
    fn online(&self) -> RpcResult<u32>;

    #[rpc(chain(0 => 0))]
    fn server(&self, name: String) -> RpcResult<ServerRemote>;
}

#[contract(name = "demo::Server", constructor(String))]
pub trait Server {
    fn send_message(&self, player: String, message: String) -> RpcResult<bool>;
}

fn registry() -> Arc<HandlerRegistry> {
    let proxy = MethodTable::new(ProxyRemote::CONTRACT_NAME)
        .on_any("online", |_| Handled::value(&42_u32))
        .on_any("server", |args| {
            let name: String = arg(args, 0)?;
            let server = MethodTable::new(ServerRemote::CONTRACT_NAME).on_any("send_message", move |args| {
                let player: String = arg(args, 0)?;
                let message: String = arg(args, 1)?;
                tracing::info!(server = %name, %player, %message, "delivering message");
                Handled::value(&true)
            });
            Ok(Handled::Object(server.into_handler()))
        });

    let registry = Arc::new(HandlerRegistry::new());
    registry.register(ProxyRemote::CONTRACT_NAME, proxy.into_handler());
    registry
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::install_fmt_subscriber("info")?;

    let config = RpcConfig::from_toml_str(
        r#"
        [cache]
        idle_timeout_secs = 600

        [invocation]
        default_timeout_ms = 2000
        "#,
    )?;
    let channel = LocalChannel::new(Arc::new(RpcDispatcher::new(registry())), "proxy-eu-1");

    let proxy: ProxyRemote = RpcFactory::new(config)
        .implementation::<ProxyRemote>()
        .target_channel(channel)
        .generate()?
        .allocate_as()?;

    println!("online players: {}", proxy.online()?);
    let delivered = proxy
        .server("survival".to_owned())?
        .send_message("Steve".to_owned(), "welcome back".to_owned())?;
    println!("message delivered: {delivered}");
    Ok(())
}
