//! REST 设备中枢数据源
//!
//! 通用家庭中枢 HTTP 接口：
//! - `GET  {base}/devices`               → `[{"id": "...", "name": "灯", "kind": "plug"}]`
//! - `GET  {base}/devices/{id}/state`    → `{"state": "on"}`
//! - `POST {base}/devices/{id}/commands` ← `{"command": "turnOn"}`
//!
//! 可选 Bearer token 鉴权；非 2xx 响应一律视为传输错误。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use crate::core::{HearthError, Result};
use crate::devices::{build_device, Device, DeviceKind, DeviceLink, DeviceSource};

#[derive(Debug, Deserialize)]
struct HubDevice {
    id: String,
    name: String,
    kind: DeviceKind,
}

#[derive(Debug, Deserialize)]
struct HubState {
    state: serde_json::Value,
}

fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

/// 单个设备的 HTTP 传输
pub struct HubLink {
    client: Client,
    base_url: String,
    token: Option<String>,
    device_id: String,
    alias: String,
}

#[async_trait]
impl DeviceLink for HubLink {
    async fn read_state(&self) -> Result<String> {
        let url = format!("{}/devices/{}/state", self.base_url, self.device_id);
        let response = authorize(self.client.get(&url), self.token.as_deref())
            .send()
            .await
            .map_err(|e| HearthError::transport(&self.alias, e))?;
        if !response.status().is_success() {
            return Err(HearthError::transport(
                &self.alias,
                format!("GET state returned {}", response.status()),
            ));
        }
        let body: HubState = response
            .json()
            .await
            .map_err(|e| HearthError::transport(&self.alias, e))?;
        // 状态字既可能是字符串，也可能是数值状态码（扫地机器人）
        Ok(match body.state {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
    }

    async fn send_command(&self, command: &str) -> Result<()> {
        let url = format!("{}/devices/{}/commands", self.base_url, self.device_id);
        let response = authorize(self.client.post(&url), self.token.as_deref())
            .json(&serde_json::json!({ "command": command }))
            .send()
            .await
            .map_err(|e| HearthError::transport(&self.alias, e))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(HearthError::transport(
                &self.alias,
                format!("POST command returned {status}: {text}"),
            ));
        }
        Ok(())
    }
}

/// 中枢数据源：发现时为每个设备创建 HubLink 与对应设备类型
pub struct HubSource {
    name: String,
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HubSource {
    pub fn new(name: impl Into<String>, base_url: &str, token: Option<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            name: name.into(),
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }
}

#[async_trait]
impl DeviceSource for HubSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover(&self) -> Result<Vec<Box<dyn Device>>> {
        let url = format!("{}/devices", self.base_url);
        let response = authorize(self.client.get(&url), self.token.as_deref())
            .send()
            .await
            .map_err(|e| HearthError::transport(&self.name, e))?;
        if !response.status().is_success() {
            return Err(HearthError::transport(
                &self.name,
                format!("GET devices returned {}", response.status()),
            ));
        }
        let listed: Vec<HubDevice> = response
            .json()
            .await
            .map_err(|e| HearthError::transport(&self.name, e))?;

        Ok(listed
            .into_iter()
            .map(|d| {
                let link = Arc::new(HubLink {
                    client: self.client.clone(),
                    base_url: self.base_url.clone(),
                    token: self.token.clone(),
                    device_id: d.id,
                    alias: d.name.clone(),
                });
                build_device(d.kind, d.name, link)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::devices::DeviceStatus;

    async fn hub_with_lamp(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/devices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "p1", "name": "灯", "kind": "plug"},
                {"id": "v1", "name": "扫地机", "kind": "vacuum"}
            ])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/devices/p1/state"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "off"})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/devices/v1/state"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": 8})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_discover_builds_typed_devices() {
        let server = MockServer::start().await;
        hub_with_lamp(&server).await;

        let source = HubSource::new("hub", &server.uri(), None, 2);
        let mut devices = source.discover().await.unwrap();
        assert_eq!(devices.len(), 2);

        for device in devices.iter_mut() {
            device.refresh_status().await;
        }
        assert_eq!(devices[0].alias(), "灯");
        assert_eq!(devices[0].status(), DeviceStatus::Off);
        assert_eq!(devices[1].status(), DeviceStatus::Docked);
    }

    #[tokio::test]
    async fn test_command_is_posted_with_token() {
        let server = MockServer::start().await;
        hub_with_lamp(&server).await;
        Mock::given(method("POST"))
            .and(path("/devices/p1/commands"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(serde_json::json!({"command": "turnOn"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let source = HubSource::new("hub", &server.uri(), Some("secret".to_string()), 2);
        let mut devices = source.discover().await.unwrap();
        devices[0].request_status_change(DeviceStatus::On).await.unwrap();
    }

    #[tokio::test]
    async fn test_discover_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/devices"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = HubSource::new("hub", &server.uri(), None, 2);
        let result = source.discover().await;
        assert!(matches!(result, Err(HearthError::DeviceTransport { .. })));
    }
}
