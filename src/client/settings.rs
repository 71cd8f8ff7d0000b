use clap::ValueEnum;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Notifications {
    #[default]
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Language {
    #[default]
    English,
    Hindi,
    Spanish,
}

impl fmt::Display for Notifications {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notifications::Enabled => write!(f, "Enabled"),
            Notifications::Disabled => write!(f, "Disabled"),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::English => write!(f, "English"),
            Language::Hindi => write!(f, "Hindi"),
            Language::Spanish => write!(f, "Spanish"),
        }
    }
}

/// User-facing strings for the client surface.
#[derive(Debug, Clone, Copy)]
pub struct Labels {
    pub ongoing: &'static str,
    pub completed: &'static str,
    pub pending: &'static str,
    pub upload_complete: &'static str,
    pub no_files: &'static str,
    pub download_link: &'static str,
}

const ENGLISH: Labels = Labels {
    ongoing: "Ongoing Transfers",
    completed: "Completed Transfers",
    pending: "Pending Transfers",
    upload_complete: "Upload complete",
    no_files: "No files uploaded yet.",
    download_link: "Download link",
};

const HINDI: Labels = Labels {
    ongoing: "चालू स्थानांतरण",
    completed: "पूर्ण स्थानांतरण",
    pending: "लंबित स्थानांतरण",
    upload_complete: "अपलोड पूरा हुआ",
    no_files: "अभी तक कोई फ़ाइल अपलोड नहीं हुई।",
    download_link: "डाउनलोड लिंक",
};

const SPANISH: Labels = Labels {
    ongoing: "Transferencias en curso",
    completed: "Transferencias completadas",
    pending: "Transferencias pendientes",
    upload_complete: "Carga completada",
    no_files: "Aún no se han subido archivos.",
    download_link: "Enlace de descarga",
};

/// Local-only preferences. Never sent to the server and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientSettings {
    notifications: Notifications,
    language: Language,
}

impl ClientSettings {
    pub fn new(notifications: Notifications, language: Language) -> Self {
        Self {
            notifications,
            language,
        }
    }

    pub fn notifications(&self) -> Notifications {
        self.notifications
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn set_notifications(&mut self, value: Notifications) {
        self.notifications = value;
    }

    pub fn set_language(&mut self, value: Language) {
        self.language = value;
    }

    pub fn notify_enabled(&self) -> bool {
        self.notifications == Notifications::Enabled
    }

    pub fn labels(&self) -> &'static Labels {
        match self.language {
            Language::English => &ENGLISH,
            Language::Hindi => &HINDI,
            Language::Spanish => &SPANISH,
        }
    }
}
