use std::sync::Arc;

use crate::application::cache::ConfigCache;
use crate::application::tokens::TokenService;

#[derive(Clone)]
pub struct ApiState {
    pub tokens: Arc<TokenService>,
    pub cache: Arc<ConfigCache>,
}
