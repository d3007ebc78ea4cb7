/// Raw file content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}
