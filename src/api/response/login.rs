use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct Data {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Login {
    pub data: Option<Data>,
    pub msg: Option<String>,
}
