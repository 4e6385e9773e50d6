use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::payment::PaymentMethod;

pub struct GatewayRequest<'a> {
    pub order_id: Uuid,
    pub amount: i64,
    pub currency: &'a str,
    pub method: PaymentMethod,
}

/// What the customer needs to complete an asynchronous payment.
#[derive(Debug, Clone)]
pub struct GatewayInit {
    pub reference: String,
    pub provider: String,
    pub redirect_url: Option<String>,
    pub instructions: Option<String>,
}

/// A payment provider that settles asynchronously through a callback.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: GatewayRequest<'_>) -> Result<GatewayInit, AppError>;
}

/// Gateway stand-in that never leaves the process.
pub struct MockGateway;

pub const MOCK_PROVIDER: &str = "MOCK_GATEWAY";

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn initialize(&self, request: GatewayRequest<'_>) -> Result<GatewayInit, AppError> {
        let reference = payment_reference("REF");
        let amount = format_amount(request.amount, request.currency);

        let (redirect_url, instructions) = match request.method {
            PaymentMethod::Card => (
                Some(format!("https://checkout.mockpay.dev/{reference}")),
                None,
            ),
            PaymentMethod::Ussd => (
                None,
                Some(format!("Dial *737*000*{}# to pay", request.amount / 100)),
            ),
            PaymentMethod::Transfer => (
                None,
                Some(format!(
                    "Transfer {amount} to MockPay Bank 0000000000 with reference {reference}"
                )),
            ),
            PaymentMethod::Wallet | PaymentMethod::Cash => {
                return Err(AppError::Validation(format!(
                    "{:?} payments are not handled by the gateway",
                    request.method
                )));
            }
        };

        Ok(GatewayInit {
            reference,
            provider: MOCK_PROVIDER.to_string(),
            redirect_url,
            instructions,
        })
    }
}

/// `<prefix>-<unix millis>-<random>`; the random part keeps references unique.
pub fn payment_reference(prefix: &str) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("{prefix}-{}-{suffix}", Utc::now().timestamp_millis())
}

pub fn format_amount(minor: i64, currency: &str) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let minor = minor.unsigned_abs();
    format!("{currency} {sign}{}.{:02}", minor / 100, minor % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ussd_returns_dial_code() {
        let init = MockGateway
            .initialize(GatewayRequest {
                order_id: Uuid::new_v4(),
                amount: 259_700,
                currency: "NGN",
                method: PaymentMethod::Ussd,
            })
            .await
            .unwrap();

        assert!(init.reference.starts_with("REF-"));
        assert_eq!(init.instructions.as_deref(), Some("Dial *737*000*2597# to pay"));
        assert!(init.redirect_url.is_none());
    }

    #[test]
    fn references_are_unique() {
        assert_ne!(payment_reference("REF"), payment_reference("REF"));
    }

    #[test]
    fn amounts_render_in_major_units() {
        assert_eq!(format_amount(2597, "NGN"), "NGN 25.97");
        assert_eq!(format_amount(-50, "NGN"), "NGN -0.50");
        assert_eq!(format_amount(-1250, "NGN"), "NGN -12.50");
    }
}
