//! Domain tags decouple URL shape from policy assignment.
//!
//! The resolver maps a path to a domain tag; this map assigns each domain a
//! policy. Unknown domains fall back to PUBLIC.

use super::PolicyTag;

pub fn policy_for_domain(domain: &str) -> PolicyTag {
    match domain {
        "health" => PolicyTag::Internal,
        "auth" => PolicyTag::Auth,
        "auth.register" => PolicyTag::Registration,
        "auth.otp" => PolicyTag::Otp,
        "users" => PolicyTag::User,
        "admin" => PolicyTag::Admin,
        _ => PolicyTag::Public,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_domains_map_to_their_policy() {
        assert_eq!(policy_for_domain("health"), PolicyTag::Internal);
        assert_eq!(policy_for_domain("auth"), PolicyTag::Auth);
        assert_eq!(policy_for_domain("auth.register"), PolicyTag::Registration);
        assert_eq!(policy_for_domain("auth.otp"), PolicyTag::Otp);
        assert_eq!(policy_for_domain("users"), PolicyTag::User);
        assert_eq!(policy_for_domain("admin"), PolicyTag::Admin);
    }

    #[test]
    fn unknown_domains_fall_back_to_public() {
        assert_eq!(policy_for_domain("public"), PolicyTag::Public);
        assert_eq!(policy_for_domain("billing"), PolicyTag::Public);
        assert_eq!(policy_for_domain(""), PolicyTag::Public);
    }
}
