pub mod domain;
pub mod ports;

pub use domain::{
    AnalysisStatus, AnalysisSummary, CardState, Lesson, LessonCatalog, LessonDetail,
    LessonProgress, LessonWithProgress, Module, ProgressStatus, ProgressUpdate, QuizQuestion,
    Recording, RecordingDashboard, Segment, StreakRecord, TodayState, User,
};
pub use ports::{
    AuthService, KeyValueStore, LessonService, PortError, PortResult, RecordingService,
};
