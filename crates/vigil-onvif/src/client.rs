use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::{OnvifError, Result};

/// 订阅有效期请求值
const SUBSCRIPTION_TERM: &str = "PT60S";

/// ONVIF 客户端
///
/// 以 SOAP-over-HTTP 访问设备服务与事件服务，使用轻量的
/// 标签提取解析响应。不实现 WS-Security 握手，仅 Basic 认证。
pub struct OnvifClient {
    client: Client,
    device_service_url: String,
    event_service_url: String,
    username: Option<String>,
    password: Option<String>,
}

/// 设备信息
#[derive(Debug, Clone)]
pub struct DeviceInformation {
    pub manufacturer: String,
    pub model: String,
    pub firmware_version: String,
    pub serial_number: String,
}

/// 拉取点订阅
///
/// `address` 是后续 PullMessages/Renew/Unsubscribe 的目标；
/// 失败后整个订阅被丢弃重建。
#[derive(Debug, Clone)]
pub struct Subscription {
    pub address: String,
    pub termination_time: DateTime<Utc>,
}

/// 原始通知
///
/// 解析自 PullMessages 响应的单条 NotificationMessage，
/// 尚未按主题过滤。
#[derive(Debug, Clone)]
pub struct RawNotification {
    pub topic: String,
    pub is_present: Option<bool>,
    pub utc_time: Option<DateTime<Utc>>,
}

/// PullMessages 响应
#[derive(Debug, Clone)]
pub struct PullResponse {
    pub termination_time: Option<DateTime<Utc>>,
    pub notifications: Vec<RawNotification>,
}

impl OnvifClient {
    pub fn new(device_service_url: String, event_service_url: String) -> Self {
        Self {
            client: Client::new(),
            device_service_url,
            event_service_url,
            username: None,
            password: None,
        }
    }

    /// 设置认证
    pub fn with_auth(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    /// 获取设备信息（连接预检）
    pub async fn get_device_information(&self) -> Result<DeviceInformation> {
        let request = Self::build_soap_request(
            r#"<GetDeviceInformation xmlns="http://www.onvif.org/ver10/device/wsdl"/>"#,
        );

        let response = self.send_request(&self.device_service_url, &request).await?;
        Ok(DeviceInformation {
            manufacturer: Self::extract_tag(&response, "Manufacturer").unwrap_or_default(),
            model: Self::extract_tag(&response, "Model").unwrap_or_default(),
            firmware_version: Self::extract_tag(&response, "FirmwareVersion").unwrap_or_default(),
            serial_number: Self::extract_tag(&response, "SerialNumber").unwrap_or_default(),
        })
    }

    /// 创建拉取点订阅
    pub async fn create_pull_point_subscription(&self) -> Result<Subscription> {
        let request = Self::build_soap_request(&format!(
            r#"<CreatePullPointSubscription xmlns="http://www.onvif.org/ver10/events/wsdl">
                <InitialTerminationTime>{}</InitialTerminationTime>
            </CreatePullPointSubscription>"#,
            SUBSCRIPTION_TERM
        ));

        let response = self.send_request(&self.event_service_url, &request).await?;

        let address = Self::extract_tag(&response, "Address")
            .ok_or_else(|| OnvifError::Protocol("Missing subscription address".to_string()))?;
        let termination_time = Self::extract_tag(&response, "TerminationTime")
            .and_then(|t| Self::parse_time(&t))
            .ok_or_else(|| OnvifError::Protocol("Missing termination time".to_string()))?;

        debug!(address = %address, "Pull point subscription created");

        Ok(Subscription {
            address,
            termination_time,
        })
    }

    /// 拉取通知
    ///
    /// 服务端最多阻塞 `timeout`，无事件时返回空列表。
    pub async fn pull_messages(
        &self,
        subscription: &Subscription,
        timeout: Duration,
    ) -> Result<PullResponse> {
        let request = Self::build_soap_request(&format!(
            r#"<PullMessages xmlns="http://www.onvif.org/ver10/events/wsdl">
                <Timeout>PT{}S</Timeout>
                <MessageLimit>32</MessageLimit>
            </PullMessages>"#,
            timeout.as_secs().max(1)
        ));

        let response = self.send_request(&subscription.address, &request).await?;

        Ok(PullResponse {
            termination_time: Self::extract_tag(&response, "TerminationTime")
                .and_then(|t| Self::parse_time(&t)),
            notifications: Self::parse_notifications(&response),
        })
    }

    /// 续订
    pub async fn renew(&self, subscription: &Subscription) -> Result<DateTime<Utc>> {
        let request = Self::build_soap_request(&format!(
            r#"<Renew xmlns="http://docs.oasis-open.org/wsn/b-2">
                <TerminationTime>{}</TerminationTime>
            </Renew>"#,
            SUBSCRIPTION_TERM
        ));

        let response = self.send_request(&subscription.address, &request).await?;

        Self::extract_tag(&response, "TerminationTime")
            .and_then(|t| Self::parse_time(&t))
            .ok_or_else(|| OnvifError::Protocol("Renew returned no termination time".to_string()))
    }

    /// 退订，尽力而为
    pub async fn unsubscribe(&self, subscription: &Subscription) -> Result<()> {
        let request = Self::build_soap_request(
            r#"<Unsubscribe xmlns="http://docs.oasis-open.org/wsn/b-2"/>"#,
        );

        self.send_request(&subscription.address, &request).await?;
        Ok(())
    }

    /// 构建 SOAP 请求
    fn build_soap_request(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  <s:Body>
    {}
  </s:Body>
</s:Envelope>"#,
            body
        )
    }

    /// 发送请求
    async fn send_request(&self, url: &str, request: &str) -> Result<String> {
        debug!(url = %url, "Sending ONVIF request");

        let mut req = self
            .client
            .post(url)
            .header("Content-Type", "application/soap+xml; charset=utf-8")
            .body(request.to_string());

        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            req = req.basic_auth(username, Some(password));
        }

        let response = req.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(OnvifError::Connect(format!(
                "ONVIF request failed: {}",
                status
            )));
        }

        Ok(text)
    }

    /// 解析通知列表
    ///
    /// 单条畸形通知被跳过，不影响同批次的其余通知。
    fn parse_notifications(xml: &str) -> Vec<RawNotification> {
        Self::extract_blocks(xml, "NotificationMessage")
            .into_iter()
            .filter_map(|block| Self::parse_single_notification(&block))
            .collect()
    }

    fn parse_single_notification(xml: &str) -> Option<RawNotification> {
        let topic = Self::extract_tag(xml, "Topic")?;

        Some(RawNotification {
            topic,
            is_present: Self::extract_boolean_item(xml),
            utc_time: Self::extract_attribute(xml, "UtcTime").and_then(|t| Self::parse_time(&t)),
        })
    }

    /// 提取数据项中的布尔值
    ///
    /// Reolink 的人形规则使用 `IsPeople`，部分固件用 `State`。
    fn extract_boolean_item(xml: &str) -> Option<bool> {
        for name in ["IsPeople", "IsMotion", "State"] {
            let pattern = format!("Name=\"{}\"", name);
            if let Some(pos) = xml.find(&pattern) {
                let tail = &xml[pos..];
                if let Some(value) = Self::extract_attribute(tail, "Value") {
                    return match value.as_str() {
                        "true" | "1" => Some(true),
                        "false" | "0" => Some(false),
                        _ => None,
                    };
                }
            }
        }
        None
    }

    fn parse_time(value: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// 提取 XML 标签内容，容忍常见命名空间前缀
    fn extract_tag(xml: &str, tag: &str) -> Option<String> {
        for prefix in ["", "tds:", "tt:", "tev:", "wsnt:", "wsa:", "wsa5:"] {
            let start_tag_open = format!("<{}{}", prefix, tag);
            let end_tag = format!("</{}{}>", prefix, tag);

            if let Some(start) = xml.find(&start_tag_open) {
                // 跳过属性直到开标签结束
                let after_open = &xml[start..];
                if let Some(close) = after_open.find('>') {
                    let content_start = start + close + 1;
                    if let Some(end) = xml[content_start..].find(&end_tag) {
                        let content = xml[content_start..content_start + end].trim();
                        return Some(content.to_string());
                    }
                }
            }
        }
        None
    }

    /// 提取 XML 属性
    fn extract_attribute(xml: &str, attr: &str) -> Option<String> {
        let pattern = format!("{}=\"", attr);
        let start = xml.find(&pattern)?;
        let content_start = start + pattern.len();
        let end = xml[content_start..].find('"')?;
        Some(xml[content_start..content_start + end].to_string())
    }

    /// 提取重复出现的 XML 块
    fn extract_blocks(xml: &str, tag: &str) -> Vec<String> {
        let mut blocks = Vec::new();

        for prefix in ["wsnt:", "tev:", ""] {
            let start_tag = format!("<{}{}", prefix, tag);
            let end_tag = format!("</{}{}>", prefix, tag);

            let mut search_start = 0;
            while let Some(block_start) = xml[search_start..].find(&start_tag) {
                let abs_start = search_start + block_start;

                if let Some(block_end) = xml[abs_start..].find(&end_tag) {
                    let abs_end = abs_start + block_end + end_tag.len();
                    blocks.push(xml[abs_start..abs_end].to_string());
                    search_start = abs_end;
                } else {
                    break;
                }
            }

            if !blocks.is_empty() {
                break;
            }
        }

        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PULL_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://www.w3.org/2003/05/soap-envelope">
  <SOAP-ENV:Body>
    <tev:PullMessagesResponse>
      <tev:CurrentTime>2024-06-01T10:00:05Z</tev:CurrentTime>
      <tev:TerminationTime>2024-06-01T10:01:00Z</tev:TerminationTime>
      <wsnt:NotificationMessage>
        <wsnt:Topic Dialect="http://www.onvif.org/ver10/tev/topicExpression/ConcreteSet">tns1:RuleEngine/MyRuleDetector/PeopleDetect</wsnt:Topic>
        <wsnt:Message>
          <tt:Message UtcTime="2024-06-01T10:00:04Z" PropertyOperation="Changed">
            <tt:Source>
              <tt:SimpleItem Name="Source" Value="000"/>
            </tt:Source>
            <tt:Data>
              <tt:SimpleItem Name="IsPeople" Value="true"/>
            </tt:Data>
          </tt:Message>
        </wsnt:Message>
      </wsnt:NotificationMessage>
      <wsnt:NotificationMessage>
        <wsnt:Topic Dialect="http://www.onvif.org/ver10/tev/topicExpression/ConcreteSet">tns1:VideoSource/MotionAlarm</wsnt:Topic>
        <wsnt:Message>
          <tt:Message UtcTime="2024-06-01T10:00:04Z">
            <tt:Data>
              <tt:SimpleItem Name="State" Value="false"/>
            </tt:Data>
          </tt:Message>
        </wsnt:Message>
      </wsnt:NotificationMessage>
    </tev:PullMessagesResponse>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;

    #[test]
    fn test_parse_notifications() {
        let notifications = OnvifClient::parse_notifications(PULL_RESPONSE);

        assert_eq!(notifications.len(), 2);
        assert!(notifications[0].topic.contains("PeopleDetect"));
        assert_eq!(notifications[0].is_present, Some(true));
        assert!(notifications[0].utc_time.is_some());

        assert!(notifications[1].topic.contains("MotionAlarm"));
        assert_eq!(notifications[1].is_present, Some(false));
    }

    #[test]
    fn test_parse_notifications_skips_malformed() {
        let xml = r#"
<wsnt:NotificationMessage>
  <wsnt:Message><tt:Message/></wsnt:Message>
</wsnt:NotificationMessage>
<wsnt:NotificationMessage>
  <wsnt:Topic>tns1:RuleEngine/MyRuleDetector/PeopleDetect</wsnt:Topic>
  <wsnt:Message>
    <tt:Message>
      <tt:Data><tt:SimpleItem Name="IsPeople" Value="1"/></tt:Data>
    </tt:Message>
  </wsnt:Message>
</wsnt:NotificationMessage>"#;

        let notifications = OnvifClient::parse_notifications(xml);

        // 无 Topic 的一条被丢弃
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].is_present, Some(true));
    }

    #[test]
    fn test_extract_tag_with_attributes() {
        let xml = r#"<wsnt:Topic Dialect="x">tns1:RuleEngine/PeopleDetect</wsnt:Topic>"#;
        assert_eq!(
            OnvifClient::extract_tag(xml, "Topic"),
            Some("tns1:RuleEngine/PeopleDetect".to_string())
        );
    }

    #[test]
    fn test_extract_tag_missing() {
        assert_eq!(OnvifClient::extract_tag("<Empty/>", "Topic"), None);
    }

    #[test]
    fn test_extract_subscription_address() {
        let xml = r#"
<tev:CreatePullPointSubscriptionResponse>
  <tev:SubscriptionReference>
    <wsa5:Address>http://192.168.1.10:8000/onvif/Subscription?Idx=0</wsa5:Address>
  </tev:SubscriptionReference>
  <wsnt:TerminationTime>2024-06-01T10:01:00Z</wsnt:TerminationTime>
</tev:CreatePullPointSubscriptionResponse>"#;

        assert_eq!(
            OnvifClient::extract_tag(xml, "Address"),
            Some("http://192.168.1.10:8000/onvif/Subscription?Idx=0".to_string())
        );
        assert!(OnvifClient::extract_tag(xml, "TerminationTime")
            .and_then(|t| OnvifClient::parse_time(&t))
            .is_some());
    }

    #[test]
    fn test_build_soap_request() {
        let request = OnvifClient::build_soap_request("<Test/>");
        assert!(request.contains("Envelope"));
        assert!(request.contains("<Test/>"));
    }

    #[test]
    fn test_boolean_item_variants() {
        let xml = r#"<tt:SimpleItem Name="State" Value="0"/>"#;
        assert_eq!(OnvifClient::extract_boolean_item(xml), Some(false));

        let xml = r#"<tt:SimpleItem Name="IsPeople" Value="maybe"/>"#;
        assert_eq!(OnvifClient::extract_boolean_item(xml), None);
    }
}
