use std::{collections::HashMap, fmt::Display};

use pwg_common::MinorUnits;
use serde::{Deserialize, Deserializer, Serialize};
use webhook_engine::db_types::{EventCode, NewNotification};

/// The fixed acknowledgement body the payment provider expects on accepted deliveries.
pub const WEBHOOK_ACK: &str = "[accepted]";

/// The provider's standard webhook envelope: one delivery carries one or more notification
/// items plus the environment flag.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRequest {
    #[serde(default, deserialize_with = "flexible_bool")]
    pub live: bool,
    #[serde(rename = "notificationItems", default)]
    pub notification_items: Vec<NotificationItemEnvelope>,
}

/// Each item sits under a `NotificationRequestItem` key inside the envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationItemEnvelope {
    #[serde(rename = "NotificationRequestItem")]
    pub notification_request_item: NotificationItem,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationItem {
    pub psp_reference: String,
    #[serde(default)]
    pub original_reference: Option<String>,
    pub merchant_reference: String,
    pub event_code: String,
    /// The provider sends this as a real boolean or as the strings "true"/"false",
    /// depending on the event type.
    #[serde(deserialize_with = "flexible_bool")]
    pub success: bool,
    #[serde(default)]
    pub payment_method: Option<String>,
    pub amount: Amount,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub additional_data: HashMap<String, String>,
}

/// Minor-unit amount plus ISO currency code, as the provider reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amount {
    pub value: i64,
    pub currency: String,
}

impl NotificationItem {
    pub fn into_new_notification(self, live: bool) -> NewNotification {
        let event_code: EventCode = self.event_code.parse().unwrap_or(EventCode::Other(self.event_code));
        let mut notification = NewNotification::new(
            self.psp_reference,
            self.merchant_reference,
            event_code,
            self.success,
            MinorUnits::from(self.amount.value),
            self.amount.currency,
        )
        .with_additional_data(self.additional_data)
        .live(live);
        notification.original_reference = self.original_reference;
        notification.payment_method = self.payment_method;
        notification.reason = self.reason;
        notification
    }
}

fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where D: Deserializer<'de>
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flexible {
        Bool(bool),
        Text(String),
    }
    match Flexible::deserialize(deserializer)? {
        Flexible::Bool(b) => Ok(b),
        Flexible::Text(s) => Ok(s.eq_ignore_ascii_case("true")),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const ENVELOPE: &str = r#"{
        "live": "false",
        "notificationItems": [
            {
                "NotificationRequestItem": {
                    "pspReference": "7914073381342284",
                    "originalReference": "9913140798220028",
                    "merchantReference": "ORDER-1001",
                    "eventCode": "REFUND",
                    "success": "true",
                    "paymentMethod": "visa",
                    "amount": { "value": 2500, "currency": "EUR" },
                    "reason": "requested by shopper",
                    "additionalData": { "hmacSignature": "c2lnbmF0dXJl" }
                }
            }
        ]
    }"#;

    #[test]
    fn the_provider_envelope_deserializes() {
        let envelope: NotificationRequest = serde_json::from_str(ENVELOPE).unwrap();
        assert!(!envelope.live);
        assert_eq!(envelope.notification_items.len(), 1);
        let item = &envelope.notification_items[0].notification_request_item;
        assert_eq!(item.psp_reference, "7914073381342284");
        assert_eq!(item.event_code, "REFUND");
        assert!(item.success);
        assert_eq!(item.amount.value, 2500);
    }

    #[test]
    fn success_parses_as_bool_or_string() {
        let json = r#"{"pspReference":"p","merchantReference":"m","eventCode":"AUTHORISATION",
            "success":true,"amount":{"value":1,"currency":"EUR"}}"#;
        let item: NotificationItem = serde_json::from_str(json).unwrap();
        assert!(item.success);
        let json = r#"{"pspReference":"p","merchantReference":"m","eventCode":"AUTHORISATION",
            "success":"false","amount":{"value":1,"currency":"EUR"}}"#;
        let item: NotificationItem = serde_json::from_str(json).unwrap();
        assert!(!item.success);
    }

    #[test]
    fn items_convert_into_new_notifications() {
        let envelope: NotificationRequest = serde_json::from_str(ENVELOPE).unwrap();
        let live = envelope.live;
        let item = envelope.notification_items.into_iter().next().unwrap().notification_request_item;
        let notification = item.into_new_notification(live);
        assert_eq!(notification.event_code, EventCode::Refund);
        assert_eq!(notification.amount, MinorUnits::from(2500));
        assert_eq!(notification.original_reference.as_deref(), Some("9913140798220028"));
        assert_eq!(notification.merchant_reference, "ORDER-1001");
        assert!(!notification.live);
        assert_eq!(notification.additional_data.get("hmacSignature").unwrap(), "c2lnbmF0dXJl");
    }

    #[test]
    fn unknown_event_codes_are_preserved() {
        let json = r#"{"pspReference":"p","merchantReference":"m","eventCode":"PAIDOUT_REVERSED",
            "success":true,"amount":{"value":1,"currency":"EUR"}}"#;
        let item: NotificationItem = serde_json::from_str(json).unwrap();
        let notification = item.into_new_notification(true);
        assert_eq!(notification.event_code, EventCode::Other("PAIDOUT_REVERSED".to_string()));
        assert!(notification.live);
    }
}
