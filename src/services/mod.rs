use serde::Serialize;

use crate::{
    dispatch::DispatchError,
    error::{AppError, AppResult},
    response::ApiResponse,
};

pub mod customer_service;
pub mod merchant_service;
pub mod rider_service;

/// Translate a dispatch outcome into the response envelope. Recoverable
/// failures become a non-200 envelope code on an otherwise normal response;
/// infrastructure faults escalate to `AppError`.
pub(crate) fn reply<T: Serialize>(
    result: Result<T, DispatchError>,
    ok_message: &str,
) -> AppResult<ApiResponse<T>> {
    match result {
        Ok(data) => Ok(ApiResponse::success(ok_message, data)),
        Err(err) => business_failure(err),
    }
}

pub(crate) fn business_failure<T: Serialize>(err: DispatchError) -> AppResult<ApiResponse<T>> {
    match err {
        DispatchError::Db(e) => Err(AppError::DbError(e)),
        DispatchError::Orm(e) => Err(AppError::OrmError(e)),
        recoverable => {
            // business_code is Some for every recoverable variant
            let code = recoverable.business_code().unwrap_or(400);
            Ok(ApiResponse::failure(code, recoverable.to_string()))
        }
    }
}
