// ImageNet class names for the ids this service reports most often.
const KNOWN_CLASSES: &[(usize, &str)] = &[
    (0, "tench"),
    (1, "goldfish"),
    (2, "great white shark"),
    (207, "golden retriever"),
    (208, "Labrador retriever"),
    (258, "Samoyed"),
    (259, "Pomeranian"),
    (260, "Chow"),
    (281, "tabby cat"),
    (282, "tiger cat"),
    (283, "Persian cat"),
];

pub fn class_name(class_id: usize) -> String {
    KNOWN_CLASSES
        .iter()
        .find(|(id, _)| *id == class_id)
        .map(|(_, name)| (*name).to_owned())
        .unwrap_or_else(|| format!("class_{}", class_id))
}
