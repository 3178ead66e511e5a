use crate::domain::payment::{AccountProperties, Amount, ExternalSysResponse};
use crate::error::{PaymentError, Result};
use crate::limiter::RateLimiter;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Url;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Calls the provider's `/external/process` endpoint for one account.
///
/// Each attempt is preceded by a deadline check: when the account's average
/// processing time no longer fits before the deadline, the payment fails with
/// `DeadlineExceeded` and no further call is made.
pub struct ExternalPaymentClient {
    properties: Arc<AccountProperties>,
    host_port: String,
    token: String,
    retry_amount: u32,
    rate_limiter: Option<Arc<RateLimiter>>,
    http: reqwest::Client,
}

impl ExternalPaymentClient {
    /// `retry_amount` is the total number of attempts and must be at least one.
    pub fn new(
        properties: Arc<AccountProperties>,
        host_port: impl Into<String>,
        token: impl Into<String>,
        retry_amount: u32,
        rate_limiter: Option<Arc<RateLimiter>>,
    ) -> Result<Self> {
        if retry_amount == 0 {
            return Err(PaymentError::InvalidConfig(
                "Retry amount must be at least 1".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(properties.average_processing_time() * 3)
            .build()?;

        Ok(Self {
            properties,
            host_port: host_port.into(),
            token: token.into(),
            retry_amount,
            rate_limiter,
            http,
        })
    }

    pub async fn execute_payment(
        &self,
        transaction_id: Uuid,
        payment_id: Uuid,
        amount: Amount,
        deadline: DateTime<Utc>,
    ) -> Result<ExternalSysResponse> {
        let url = self.request_url(transaction_id, payment_id, amount)?;
        let processing_time = ChronoDuration::from_std(self.properties.average_processing_time())
            .unwrap_or(ChronoDuration::MAX);

        let mut last = None;
        for attempt in 0..self.retry_amount {
            check_time_left(payment_id, processing_time, deadline)?;

            if let Some(rate_limiter) = &self.rate_limiter {
                // Never wait beyond the last moment the call could still start.
                let budget = (deadline - Utc::now())
                    .checked_sub(&processing_time)
                    .and_then(|budget| budget.to_std().ok())
                    .unwrap_or_default();
                match tokio::time::timeout(budget, rate_limiter.acquire()).await {
                    Ok(admitted) => admitted?,
                    Err(_) => {
                        warn!(
                            account = %self.properties.account_name,
                            %transaction_id,
                            %payment_id,
                            attempt,
                            "Deadline reached while waiting for the rate limiter"
                        );
                        return Err(PaymentError::DeadlineExceeded {
                            payment_id,
                            time_left_ms: (deadline - Utc::now()).num_milliseconds(),
                        });
                    }
                }
                check_time_left(payment_id, processing_time, deadline)?;
            }

            match self.send(&url).await {
                Ok(body) => {
                    let response = match serde_json::from_str::<ExternalSysResponse>(&body) {
                        Ok(response) => response,
                        Err(e) => {
                            error!(
                                account = %self.properties.account_name,
                                %transaction_id,
                                %payment_id,
                                "Bad response: {}",
                                body
                            );
                            return Ok(ExternalSysResponse::failed(
                                transaction_id,
                                payment_id,
                                format!("Malformed provider response ({e}): {body}"),
                            ));
                        }
                    };

                    info!(
                        account = %self.properties.account_name,
                        %transaction_id,
                        %payment_id,
                        succeeded = response.result,
                        attempt,
                        time_left_ms = (deadline - Utc::now()).num_milliseconds(),
                        "Payment processed: {:?}",
                        response.message
                    );
                    if response.result {
                        return Ok(response);
                    }
                    last = Some(Ok(response));
                }
                Err(e) if e.is_timeout() => {
                    warn!(
                        account = %self.properties.account_name,
                        %transaction_id,
                        %payment_id,
                        attempt,
                        "Payment call timed out"
                    );
                    last = Some(Err(PaymentError::external_timeout(
                        self.properties.average_processing_time(),
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }

        last.unwrap_or_else(|| {
            Ok(ExternalSysResponse::failed(
                transaction_id,
                payment_id,
                "No attempt was made",
            ))
        })
    }

    async fn send(&self, url: &Url) -> Result<String, reqwest::Error> {
        self.http.post(url.clone()).body("").send().await?.text().await
    }

    fn request_url(&self, transaction_id: Uuid, payment_id: Uuid, amount: Amount) -> Result<Url> {
        let base = format!("http://{}/external/process", self.host_port);
        let transaction_id = transaction_id.to_string();
        let payment_id = payment_id.to_string();
        let amount = amount.to_string();
        Url::parse_with_params(
            &base,
            [
                ("serviceName", self.properties.service_name.as_str()),
                ("token", self.token.as_str()),
                ("accountName", self.properties.account_name.as_str()),
                ("transactionId", transaction_id.as_str()),
                ("paymentId", payment_id.as_str()),
                ("amount", amount.as_str()),
            ],
        )
        .map_err(|e| PaymentError::InvalidConfig(format!("Bad provider address {base}: {e}")))
    }
}

/// Fails when the average processing time no longer fits before `deadline`.
fn check_time_left(
    payment_id: Uuid,
    processing_time: ChronoDuration,
    deadline: DateTime<Utc>,
) -> Result<()> {
    let now = Utc::now();
    if now
        .checked_add_signed(processing_time)
        .is_none_or(|done| done > deadline)
    {
        return Err(PaymentError::DeadlineExceeded {
            payment_id,
            time_left_ms: (deadline - now).num_milliseconds(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(retry_amount: u32) -> Result<ExternalPaymentClient> {
        let properties = AccountProperties {
            account_name: "acc-1".to_string(),
            service_name: "shop".to_string(),
            ..AccountProperties::default()
        };
        ExternalPaymentClient::new(
            Arc::new(properties),
            "localhost:1234",
            "secret",
            retry_amount,
            None,
        )
    }

    #[test]
    fn test_rejects_zero_retry_amount() {
        assert!(matches!(
            client(0),
            Err(PaymentError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_request_url_carries_all_parameters() {
        let client = client(3).unwrap();
        let transaction_id = Uuid::new_v4();
        let payment_id = Uuid::new_v4();

        let url = client
            .request_url(transaction_id, payment_id, Amount::new(250).unwrap())
            .unwrap();

        assert_eq!(url.path(), "/external/process");
        assert_eq!(url.host_str(), Some("localhost"));
        assert_eq!(url.port(), Some(1234));
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            query,
            vec![
                ("serviceName".to_string(), "shop".to_string()),
                ("token".to_string(), "secret".to_string()),
                ("accountName".to_string(), "acc-1".to_string()),
                ("transactionId".to_string(), transaction_id.to_string()),
                ("paymentId".to_string(), payment_id.to_string()),
                ("amount".to_string(), "250".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_past_deadline_fails_without_calling() {
        let client = client(3).unwrap();
        let payment_id = Uuid::new_v4();

        let result = client
            .execute_payment(
                Uuid::new_v4(),
                payment_id,
                Amount::new(1).unwrap(),
                Utc::now() - ChronoDuration::seconds(1),
            )
            .await;

        match result {
            Err(PaymentError::DeadlineExceeded {
                payment_id: failed,
                time_left_ms,
            }) => {
                assert_eq!(failed, payment_id);
                assert!(time_left_ms < 0);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
