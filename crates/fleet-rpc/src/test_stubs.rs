//! 通道测试桩集合。
//!
//! # 设计定位（Why）
//! - 合成、缓存与链式调用的测试都需要一条满足 [`Channel`] 契约的通道，但多数场景只关心
//!   “发出了什么请求”与“收到什么响应”；
//! - 集中提供桩对象，避免各测试文件重复实现编码与记录逻辑。
//!
//! # 契约说明（What）
//! - 桩通道使用 [`JsonSerializer`] 解码请求，生产代码若切换序列化器需改用自定义桩；
//! - 桩通道不做网络 I/O，响应在 Future 首次轮询时即就绪。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::error::{RpcError, TransportError};
use crate::future::RpcFuture;
use crate::invocation::{Channel, JsonSerializer, RequestEnvelope, Serializer, WireRequest, WireResponse};

fn respond(response: &WireResponse) -> RpcFuture<Vec<u8>> {
    let encoded = JsonSerializer.encode_response(response).map_err(RpcError::from);
    futures::future::ready(encoded).boxed()
}

fn decode(request: &RequestEnvelope) -> Result<WireRequest, RpcError> {
    JsonSerializer
        .decode_request(&request.payload)
        .map_err(RpcError::from)
}

/// 回显通道：以 `[方法名, 实参数组]` 响应终端帧。
#[derive(Debug, Default)]
pub struct EchoChannel;

impl EchoChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl Channel for EchoChannel {
    fn send_query(&self, request: RequestEnvelope) -> RpcFuture<Vec<u8>> {
        let request = match decode(&request) {
            Ok(request) => request,
            Err(err) => return futures::future::ready(Err(err)).boxed(),
        };
        let value = match request.terminal() {
            Some(frame) => json!([frame.method, frame.args]),
            None => Value::Null,
        };
        respond(&WireResponse::Success { value })
    }

    fn send(&self, _request: RequestEnvelope) -> Result<(), TransportError> {
        Ok(())
    }

    fn peer(&self) -> &str {
        "echo"
    }
}

/// 记录型通道：保存解码后的请求，并以预设响应回复。
#[derive(Debug)]
pub struct RecordingChannel {
    response: Mutex<WireResponse>,
    requests: Mutex<Vec<WireRequest>>,
    envelopes: Mutex<Vec<RequestEnvelope>>,
    queries: AtomicUsize,
    sends: AtomicUsize,
    connected: AtomicBool,
}

impl Default for RecordingChannel {
    fn default() -> Self {
        Self {
            response: Mutex::new(WireResponse::Success { value: Value::Null }),
            requests: Mutex::new(Vec::new()),
            envelopes: Mutex::new(Vec::new()),
            queries: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
            connected: AtomicBool::new(true),
        }
    }
}

impl RecordingChannel {
    /// 默认以 `null` 成功响应。
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(value: Value) -> Self {
        let channel = Self::default();
        channel.respond_with(WireResponse::Success { value });
        channel
    }

    /// 以远端失败响应后续请求。
    pub fn failing(code: &str, message: &str) -> Self {
        let channel = Self::default();
        channel.respond_with(WireResponse::failure(code, message));
        channel
    }

    pub fn respond_with(&self, response: WireResponse) {
        *self.response.lock() = response;
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<WireRequest> {
        self.requests.lock().last().cloned()
    }

    pub fn envelopes(&self) -> Vec<RequestEnvelope> {
        self.envelopes.lock().clone()
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::Acquire)
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::Acquire)
    }

    fn record(&self, request: &RequestEnvelope) -> Result<(), RpcError> {
        let decoded = decode(request)?;
        self.envelopes.lock().push(request.clone());
        self.requests.lock().push(decoded);
        Ok(())
    }
}

impl Channel for RecordingChannel {
    fn send_query(&self, request: RequestEnvelope) -> RpcFuture<Vec<u8>> {
        self.queries.fetch_add(1, Ordering::AcqRel);
        if let Err(err) = self.record(&request) {
            return futures::future::ready(Err(err)).boxed();
        }
        let response = self.response.lock().clone();
        respond(&response)
    }

    fn send(&self, request: RequestEnvelope) -> Result<(), TransportError> {
        self.sends.fetch_add(1, Ordering::AcqRel);
        self.record(&request).map_err(|err| TransportError::Io {
            detail: err.to_string(),
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn peer(&self) -> &str {
        "recording"
    }
}
