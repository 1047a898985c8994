use crate::{
    api::{
        applications, attendance, connections, interviews, jobs, leave_request, loan_request,
        notices, users, vendor_projects,
    },
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::anyhow;
use std::sync::Arc;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> anyhow::Result<Limiter> {
    let burst = requests_per_min.max(1);
    let per_ms = (60_000 / u64::from(burst)).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(burst)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit of {requests_per_min}/min"))?;
    Ok(Arc::new(Governor::new(&cfg)))
}

/// Built once so every worker shares the same buckets.
#[derive(Clone)]
pub struct Limiters {
    login: Limiter,
    register: Limiter,
    refresh: Limiter,
    public: Limiter,
    protected: Limiter,
}

impl Limiters {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            login: build_limiter(config.rate_login_per_min)?,
            register: build_limiter(config.rate_register_per_min)?,
            refresh: build_limiter(config.rate_refresh_per_min)?,
            public: build_limiter(config.rate_public_per_min)?,
            protected: build_limiter(config.rate_protected_per_min)?,
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &Limiters) {
    let prefix = config.api_prefix.trim_end_matches('/');

    // Public routes
    cfg.service(
        web::scope(&format!("{prefix}/auth"))
            .service(
                web::resource("/login")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(limiters.register.clone())
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(limiters.refresh.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::logout)),
            )
            .service(
                web::resource("/email-available")
                    .wrap(limiters.public.clone())
                    .route(web::get().to(handlers::email_available)),
            ),
    );

    cfg.service(
        web::scope(&format!("{prefix}/public"))
            .wrap(limiters.public.clone())
            .service(web::resource("/jobs").route(web::get().to(jobs::public_job_list)))
            .service(web::resource("/jobs/{id}").route(web::get().to(jobs::public_get_job)))
            .service(web::resource("/jobs/{id}/apply").route(web::post().to(jobs::apply_for_job))),
    );

    // Protected routes
    cfg.service(
        web::scope(prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(limiters.protected.clone()) // rate limiting
            .service(web::resource("/me").route(web::get().to(handlers::me)))
            .service(
                web::scope("/users")
                    .service(
                        web::resource("")
                            .route(web::get().to(users::list_accounts))
                            .route(web::post().to(users::create_account)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(users::get_account))
                            .route(web::put().to(users::update_account))
                            .route(web::delete().to(users::delete_account)),
                    ),
            )
            .service(
                web::scope("/connections").service(
                    web::resource("")
                        .route(web::get().to(connections::list_connections))
                        .route(web::post().to(connections::create_connection))
                        .route(web::delete().to(connections::delete_connection)),
                ),
            )
            .service(
                web::scope("/vendor-projects")
                    .service(
                        web::resource("")
                            .route(web::get().to(vendor_projects::list_projects))
                            .route(web::post().to(vendor_projects::create_project)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(vendor_projects::get_project))
                            .route(web::put().to(vendor_projects::update_project))
                            .route(web::delete().to(vendor_projects::delete_project)),
                    ),
            )
            .service(
                web::scope("/jobs")
                    .service(
                        web::resource("")
                            .route(web::get().to(jobs::list_jobs))
                            .route(web::post().to(jobs::create_job)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(jobs::get_job))
                            .route(web::put().to(jobs::update_job))
                            .route(web::delete().to(jobs::delete_job)),
                    ),
            )
            .service(
                web::scope("/applications")
                    .service(
                        web::resource("")
                            .route(web::get().to(applications::list_applications))
                            .route(web::post().to(applications::create_application)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(applications::get_application))
                            .route(web::put().to(applications::update_application))
                            .route(web::delete().to(applications::delete_application)),
                    )
                    .service(
                        web::resource("/{id}/status")
                            .route(web::put().to(applications::set_application_status)),
                    )
                    .service(
                        web::resource("/{id}/interview")
                            .route(web::post().to(applications::schedule_application_interview)),
                    ),
            )
            .service(
                web::scope("/interviews")
                    .service(web::resource("").route(web::get().to(interviews::list_interviews)))
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(interviews::get_interview))
                            .route(web::put().to(interviews::update_interview))
                            .route(web::delete().to(interviews::delete_interview)),
                    )
                    .service(
                        web::resource("/{id}/status")
                            .route(web::put().to(interviews::set_interview_status)),
                    ),
            )
            .service(
                web::scope("/notices")
                    .service(
                        web::resource("")
                            .route(web::get().to(notices::list_notices))
                            .route(web::post().to(notices::create_notice)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(notices::get_notice))
                            .route(web::put().to(notices::update_notice))
                            .route(web::delete().to(notices::delete_notice)),
                    ),
            )
            .service(
                web::scope("/leave")
                    // /leave
                    .service(
                        web::resource("")
                            .route(web::get().to(leave_request::leave_list))
                            .route(web::post().to(leave_request::create_leave)),
                    )
                    // before /{id} so "balance" is not taken for an id
                    .service(
                        web::resource("/balance").route(web::get().to(leave_request::leave_balance)),
                    )
                    // /leave/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(leave_request::get_leave))
                            .route(web::put().to(leave_request::update_leave))
                            .route(web::delete().to(leave_request::delete_leave)),
                    )
                    .service(
                        web::resource("/{id}/status")
                            .route(web::put().to(leave_request::set_leave_status)),
                    )
                    // /leave/{id}/approve
                    .service(
                        web::resource("/{id}/approve")
                            .route(web::put().to(leave_request::approve_leave)),
                    )
                    // /leave/{id}/reject
                    .service(
                        web::resource("/{id}/reject")
                            .route(web::put().to(leave_request::reject_leave)),
                    ),
            )
            .service(
                web::scope("/loans")
                    .service(
                        web::resource("")
                            .route(web::get().to(loan_request::loan_list))
                            .route(web::post().to(loan_request::create_loan)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(loan_request::get_loan))
                            .route(web::put().to(loan_request::update_loan))
                            .route(web::delete().to(loan_request::delete_loan)),
                    )
                    .service(
                        web::resource("/{id}/status")
                            .route(web::put().to(loan_request::set_loan_status)),
                    )
                    .service(
                        web::resource("/{id}/approve")
                            .route(web::put().to(loan_request::approve_loan)),
                    )
                    .service(
                        web::resource("/{id}/reject")
                            .route(web::put().to(loan_request::reject_loan)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    // /attendance
                    .service(
                        web::resource("")
                            .route(web::get().to(attendance::attendance_list))
                            .route(web::put().to(attendance::check_out))
                            .route(web::post().to(attendance::check_in)),
                    )
                    .service(
                        web::resource("/mark").route(web::post().to(attendance::mark_attendance)),
                    )
                    .service(
                        web::resource("/missing")
                            .route(web::get().to(attendance::missing_attendance)),
                    ),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days, stored and revocable)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ old refresh token revoked, new pair returned

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_still_builds_a_limiter() {
        assert!(build_limiter(0).is_ok());
        assert!(build_limiter(120_000).is_ok());
    }
}
