use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Cell ({x}, {y}) is outside the grid")]
    OutOfBounds { x: i32, y: i32 },

    #[error("No path found from {from:?} to {to:?}")]
    NoPathFound { from: (i32, i32), to: (i32, i32) },

    #[error("Cell ({x}, {y}) is occupied or an obstacle")]
    OccupiedOrObstacle { x: i32, y: i32 },

    #[error("Unknown robot: {id}")]
    UnknownRobot { id: u32 },

    #[error("Obstacle edit at ({x}, {y}) denied: cell is reserved by robot {robot}")]
    ObstacleEditDenied { x: i32, y: i32, robot: u32 },

    #[error("Planning budget exceeded after {expanded} expansions")]
    PlanningBudgetExceeded { expanded: usize },

    #[error("Invalid command: {reason}")]
    InvalidCommand { reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Infrastructure error: {0}")]
    InfrastructureError(String),
}

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Event store error: {0}")]
    EventStore(String),

    #[error("Report sink error: {0}")]
    ReportSink(String),

    #[error("Fleet service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(#[from] anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;
pub type ApplicationResult<T> = Result<T, ApplicationError>;
