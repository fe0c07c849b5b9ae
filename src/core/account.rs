/// Power account linked to the authenticated EPB identity.
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq, bon::Builder)]
pub struct Account {
    #[builder(into)]
    pub id: String,

    /// GIS identifier of the premise, when the account link carries one.
    pub gis_id: Option<i64>,

    #[builder(into)]
    pub nickname: Option<String>,

    #[builder(into)]
    pub status: Option<String>,

    /// Full service address of the premise.
    #[builder(into)]
    pub address: Option<String>,
}
