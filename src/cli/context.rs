use crate::client::GatewayClient;
use crate::profile::Profile;

pub struct Context {
    pub client: GatewayClient,
}

impl Context {
    pub fn load() -> anyhow::Result<Self> {
        let profile = Profile::load()?;

        Ok(Self {
            client: GatewayClient::new(&profile.endpoint, &profile.apikey),
        })
    }
}
