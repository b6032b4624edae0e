pub fn refresh_endpoint() -> &'static str {
    "/auth/refresh"
}

pub fn social_login_endpoint() -> &'static str {
    "/auth/social"
}

pub fn login_endpoint() -> &'static str {
    "/auth/login"
}
