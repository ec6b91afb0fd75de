use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::descriptor::Signature;
use crate::error::codes;
use crate::invocation::{JsonSerializer, Serializer, WireRequest, WireResponse};

use super::handler::{Handled, HandlerFailure};
use super::registry::HandlerRegistry;

/// 接收端请求调度器：解码请求、回放调用链、编码响应。
///
/// # 契约说明（What）
/// - 第一帧在注册的根处理器上执行，之后每一帧在上一帧返回的对象上执行；
/// - 任何一帧失败即停止回放，并以失败响应报告；
/// - 请求声明 `expects_result == false` 时不产出响应字节；
/// - 无法解码的请求总是以失败响应报告（此时无法得知调用方是否等待结果）。
pub struct RpcDispatcher {
    registry: Arc<HandlerRegistry>,
    serializer: Arc<dyn Serializer>,
}

impl RpcDispatcher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self::with_serializer(registry, Arc::new(JsonSerializer))
    }

    pub fn with_serializer(registry: Arc<HandlerRegistry>, serializer: Arc<dyn Serializer>) -> Self {
        Self {
            registry,
            serializer,
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// 处理一条请求；返回需要回送的响应字节。
    pub fn dispatch(&self, payload: &[u8]) -> Option<Vec<u8>> {
        let response = match self.serializer.decode_request(payload) {
            Ok(request) => {
                let response = self.replay(&request);
                if !request.expects_result {
                    if let WireResponse::Failure { code, message } = &response {
                        warn!(target_contract = %request.target, %code, %message, "one-way invocation failed");
                    }
                    return None;
                }
                response
            }
            Err(err) => {
                warn!(error = %err, "dropping undecodable request");
                WireResponse::failure(codes::CODEC, err.to_string())
            }
        };

        match self.serializer.encode_response(&response) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(error = %err, "failed to encode response");
                None
            }
        }
    }

    /// 回放调用链。
    pub fn replay(&self, request: &WireRequest) -> WireResponse {
        match self.replay_frames(request) {
            Ok(value) => WireResponse::Success { value },
            Err(failure) => WireResponse::Failure {
                code: failure.code,
                message: failure.message,
            },
        }
    }

    fn replay_frames(&self, request: &WireRequest) -> Result<Value, HandlerFailure> {
        let mut current = self.registry.get(&request.target).ok_or_else(|| {
            HandlerFailure::new(
                codes::UNKNOWN_TARGET,
                format!("no handler registered for `{}`", request.target),
            )
        })?;

        let last = request.frames.len().saturating_sub(1);
        for (position, frame) in request.frames.iter().enumerate() {
            let signature = Signature::from_descriptor(&frame.signature);
            let handled = current.handle(&frame.method, &signature, &frame.args)?;
            debug!(
                target_contract = %request.target,
                method = %frame.method,
                position,
                "replayed frame"
            );

            if position == last {
                return Ok(match handled {
                    Handled::Value(value) => value,
                    Handled::Unit | Handled::Object(_) => Value::Null,
                });
            }
            current = match handled {
                Handled::Object(next) => next,
                other => {
                    return Err(HandlerFailure::new(
                        codes::BROKEN_CHAIN,
                        format!(
                            "frame {position} (`{}`) produced {other:?} instead of an object",
                            frame.method
                        ),
                    ));
                }
            };
        }

        Err(HandlerFailure::new(codes::BROKEN_CHAIN, "request carries no frames"))
    }
}

impl std::fmt::Debug for RpcDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcDispatcher")
            .field("registry", &self.registry)
            .field("serializer", &self.serializer.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::invocation::InvocationFrame;
    use crate::server::handler::{MethodTable, arg};

    fn frame(method: &str, args: Vec<Value>) -> InvocationFrame {
        InvocationFrame {
            contract: "fleet::Root".to_owned(),
            method: method.to_owned(),
            signature: "()->()".to_owned(),
            args,
        }
    }

    fn dispatcher() -> RpcDispatcher {
        let mid = MethodTable::new("fleet::Mid")
            .on_any("b", |args| Handled::value(&(arg::<i64>(args, 0)? * 2)))
            .into_handler();
        let root = MethodTable::new("fleet::Root").on_any("a", move |_| Ok(Handled::Object(Arc::clone(&mid))));
        let registry = Arc::new(HandlerRegistry::new());
        registry.register("fleet::Root", root.into_handler());
        RpcDispatcher::new(registry)
    }

    #[test]
    fn replays_chain_against_returned_objects() {
        let request = WireRequest {
            target: "fleet::Root".to_owned(),
            frames: vec![frame("a", vec![]), frame("b", vec![json!(21)])],
            expects_result: true,
        };
        assert_eq!(
            dispatcher().replay(&request),
            WireResponse::Success { value: json!(42) }
        );
    }

    #[test]
    fn intermediate_value_breaks_the_chain() {
        let request = WireRequest {
            target: "fleet::Root".to_owned(),
            frames: vec![frame("a", vec![]), frame("b", vec![json!(1)]), frame("c", vec![])],
            expects_result: true,
        };
        assert!(matches!(
            dispatcher().replay(&request),
            WireResponse::Failure { ref code, .. } if code == codes::BROKEN_CHAIN
        ));
    }

    #[test]
    fn one_way_request_produces_no_response() {
        let request = WireRequest {
            target: "fleet::Root".to_owned(),
            frames: vec![frame("missing", vec![])],
            expects_result: false,
        };
        let bytes = JsonSerializer.encode_request(&request).unwrap();
        assert!(dispatcher().dispatch(&bytes).is_none());
    }

    #[test]
    fn unknown_target_is_reported() {
        let request = WireRequest {
            target: "fleet::Nobody".to_owned(),
            frames: vec![frame("a", vec![])],
            expects_result: true,
        };
        let bytes = JsonSerializer.encode_request(&request).unwrap();
        let response = JsonSerializer
            .decode_response(&dispatcher().dispatch(&bytes).expect("response expected"))
            .unwrap();
        assert!(matches!(response, WireResponse::Failure { ref code, .. } if code == codes::UNKNOWN_TARGET));
    }
}
