//! HTTP adapter for the external wallet service.
//!
//! JSON over `POST`, camelCase fields. Every request carries the connect and
//! request timeouts from [`GatewayConfig`]; a timeout is reported like any other
//! transport failure, as [`GatewayError::Unavailable`].

use super::{
    BalanceValidation, CvuValidation, DepositOrder, DepositReceipt, DepositStatus, GatewayResult,
    WalletGateway,
};
use crate::account::AccountId;
use crate::amount::Amount;
use crate::config::GatewayConfig;
use crate::error::{EngineError, GatewayError, Result};
use crate::transaction::Currency;
use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const VALIDATE_PATH: &str = "/api/v1/wallet/validate";
const VALIDATE_BALANCE_PATH: &str = "/api/v1/wallet/validate-balance";
const DEPOSIT_PATH: &str = "/api/v1/wallet/deposit";

#[derive(Debug, Serialize)]
struct CvuRequest {
    cvu: u64,
}

#[derive(Debug, Serialize)]
struct BalanceRequest {
    cvu: u64,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DepositRequestBody<'a> {
    destination_cvu: u64,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    currency: Currency,
    reference: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CvuResponse {
    exists: Option<bool>,
    bank_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceResponse {
    exists: Option<bool>,
    balance: Option<f64>,
    has_sufficient_funds: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositResponseBody {
    transaction_id: Option<String>,
    status: Option<String>,
    message: Option<String>,
}

/// Either a decoded success body or the non-success status code.
enum Reply<R> {
    Success(R),
    Status(StatusCode),
}

pub struct HttpWalletGateway {
    client: Client,
    base_url: String,
}

impl HttpWalletGateway {
    /// Builds the client. No retry policy is installed.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(HttpWalletGateway {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn post<B, R>(&self, path: &str, body: &B) -> GatewayResult<Reply<R>>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            warn!("POST {} answered {}", url, status);
            return Ok(Reply::Status(status));
        }

        let payload = response.json::<R>().map_err(|e| {
            GatewayError::Unavailable(format!("unexpected payload from {}: {}", path, e))
        })?;
        Ok(Reply::Success(payload))
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Unavailable(format!("request timed out: {}", e))
    } else {
        GatewayError::Unavailable(format!("failed to reach external wallet service: {}", e))
    }
}

fn unexpected_status(status: StatusCode) -> GatewayError {
    GatewayError::Unavailable(format!("external service error: HTTP {}", status))
}

impl WalletGateway for HttpWalletGateway {
    fn validate_account_exists(&self, cvu: AccountId) -> GatewayResult<CvuValidation> {
        let reply = self.post::<_, CvuResponse>(VALIDATE_PATH, &CvuRequest { cvu: cvu.0 })?;

        let body = match reply {
            Reply::Success(body) => body,
            Reply::Status(StatusCode::NOT_FOUND) => return Err(GatewayError::NotFound(cvu)),
            Reply::Status(status) => return Err(unexpected_status(status)),
        };

        match body.exists {
            Some(true) => Ok(CvuValidation {
                cvu,
                bank_name: body.bank_name,
            }),
            Some(false) => Err(GatewayError::NotFound(cvu)),
            None => Err(GatewayError::Unavailable(
                "validation response missing 'exists'".to_string(),
            )),
        }
    }

    fn validate_sufficient_balance(
        &self,
        cvu: AccountId,
        amount: Amount,
    ) -> GatewayResult<BalanceValidation> {
        self.validate_account_exists(cvu)?;

        let request = BalanceRequest {
            cvu: cvu.0,
            amount: amount.as_decimal(),
        };
        let reply = self.post::<_, BalanceResponse>(VALIDATE_BALANCE_PATH, &request)?;

        let body = match reply {
            Reply::Success(body) => body,
            Reply::Status(StatusCode::NOT_FOUND) => return Err(GatewayError::NotFound(cvu)),
            Reply::Status(StatusCode::BAD_REQUEST) => {
                return Err(GatewayError::InsufficientFunds { cvu, amount })
            }
            Reply::Status(status) => return Err(unexpected_status(status)),
        };

        if body.exists == Some(false) {
            return Err(GatewayError::NotFound(cvu));
        }

        // insufficiency is only reported when the remote says so explicitly
        match body.has_sufficient_funds {
            Some(true) => Ok(BalanceValidation {
                cvu,
                balance: body.balance.and_then(Decimal::from_f64).map(Amount::new),
            }),
            Some(false) => Err(GatewayError::InsufficientFunds { cvu, amount }),
            None => Err(GatewayError::Unavailable(
                "balance response missing 'hasSufficientFunds'".to_string(),
            )),
        }
    }

    fn initiate_deposit(&self, order: &DepositOrder) -> GatewayResult<DepositReceipt> {
        let request = DepositRequestBody {
            destination_cvu: order.destination.0,
            amount: order.amount.as_decimal(),
            currency: order.currency,
            reference: &order.reference,
        };
        let reply = self.post::<_, DepositResponseBody>(DEPOSIT_PATH, &request)?;

        let body = match reply {
            Reply::Success(body) => body,
            Reply::Status(StatusCode::NOT_FOUND) => {
                return Err(GatewayError::NotFound(order.destination))
            }
            Reply::Status(status) => return Err(unexpected_status(status)),
        };

        let status = body.status.ok_or_else(|| {
            GatewayError::Unavailable("deposit response missing 'status'".to_string())
        })?;

        Ok(DepositReceipt {
            remote_transaction_id: body.transaction_id.unwrap_or_default(),
            status: DepositStatus::parse(&status),
            message: body.message,
        })
    }
}
