use http::StatusCode;

use super::Response;

macro_rules! status_responses {
    ($($name:ident => $code:ident,)*) => {
        impl Response {
            $(
                #[doc = concat!("`", stringify!($code), "` with a short message.")]
                pub fn $name(message: impl Into<String>) -> Self {
                    Self::status(StatusCode::$code, message)
                }
            )*
        }
    };
}

status_responses! {
    created => CREATED,
    accepted => ACCEPTED,
    reset_content => RESET_CONTENT,
    not_modified => NOT_MODIFIED,
    bad_request => BAD_REQUEST,
    forbidden => FORBIDDEN,
    not_found => NOT_FOUND,
    method_not_allowed => METHOD_NOT_ALLOWED,
    not_acceptable => NOT_ACCEPTABLE,
    request_timeout => REQUEST_TIMEOUT,
    conflict => CONFLICT,
    gone => GONE,
    length_required => LENGTH_REQUIRED,
    precondition_failed => PRECONDITION_FAILED,
    payload_too_large => PAYLOAD_TOO_LARGE,
    uri_too_long => URI_TOO_LONG,
    unsupported_media_type => UNSUPPORTED_MEDIA_TYPE,
    range_not_satisfiable => RANGE_NOT_SATISFIABLE,
    expectation_failed => EXPECTATION_FAILED,
    im_a_teapot => IM_A_TEAPOT,
    unprocessable_entity => UNPROCESSABLE_ENTITY,
    failed_dependency => FAILED_DEPENDENCY,
    upgrade_required => UPGRADE_REQUIRED,
    precondition_required => PRECONDITION_REQUIRED,
    too_many_requests => TOO_MANY_REQUESTS,
    request_header_fields_too_large => REQUEST_HEADER_FIELDS_TOO_LARGE,
    unavailable_for_legal_reasons => UNAVAILABLE_FOR_LEGAL_REASONS,
    internal_server_error => INTERNAL_SERVER_ERROR,
    not_implemented => NOT_IMPLEMENTED,
    bad_gateway => BAD_GATEWAY,
    service_unavailable => SERVICE_UNAVAILABLE,
    gateway_timeout => GATEWAY_TIMEOUT,
    http_version_not_supported => HTTP_VERSION_NOT_SUPPORTED,
    variant_also_negotiates => VARIANT_ALSO_NEGOTIATES,
    insufficient_storage => INSUFFICIENT_STORAGE,
    loop_detected => LOOP_DETECTED,
    not_extended => NOT_EXTENDED,
    network_authentication_required => NETWORK_AUTHENTICATION_REQUIRED,
}

impl Response {
    /// `425 Too Early` with a short message.
    pub fn too_early(message: impl Into<String>) -> Self {
        // 425 is within the valid range, so the fallback is never taken.
        let code = StatusCode::from_u16(425).unwrap_or(StatusCode::BAD_REQUEST);
        Self::status(code, message)
    }
}
